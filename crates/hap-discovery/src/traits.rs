//! Trait definitions for advertisement (enables mocking in tests).

use crate::Advertisement;
use async_trait::async_trait;
use hap_core::Result;

/// Publishes the accessory on the local network.
///
/// The server calls [`Advertiser::advertise`] on start and again whenever
/// the TXT record changes (pairing status, configuration number); an
/// implementation must treat a repeat call as an update.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait Advertiser: Send + Sync {
    /// Announce or re-announce the accessory.
    async fn advertise(&self, advertisement: &Advertisement) -> Result<()>;

    /// Stop announcing.
    async fn withdraw(&self) -> Result<()>;
}
