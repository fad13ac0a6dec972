use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use hap_crypto::chacha::ControlCipher;
use hap_crypto::srp::{SrpChallenge, SrpClient, SrpServer, PAIR_SETUP_IDENTITY};
use hap_crypto::tlv::{Tlv8, TlvType};

/// Benchmark session channel encryption.
///
/// Responses and EVENT messages are usually a few hundred bytes;
/// `/accessories` on a large bridge spans many frames.
fn bench_session_encryption(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_encryption");

    for size in [128, 1024, 16384] {
        group.throughput(Throughput::Bytes(size as u64));

        let mut cipher = ControlCipher::new([0x42u8; 32], [0x24u8; 32]);
        let plaintext = vec![0xABu8; size];

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| cipher.encrypt(black_box(&plaintext)));
        });
    }

    group.finish();
}

/// Benchmark session channel decryption with the incremental decoder.
fn bench_session_decryption(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_decryption");

    for size in [128, 1024, 16384] {
        group.throughput(Throughput::Bytes(size as u64));

        let mut encrypt_cipher = ControlCipher::new([0x42u8; 32], [0x24u8; 32]);
        let ciphertext = encrypt_cipher.encrypt(&vec![0xABu8; size]).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter_batched(
                || {
                    (
                        ControlCipher::new([0x24u8; 32], [0x42u8; 32]),
                        ciphertext.clone(),
                    )
                },
                |(mut cipher, mut buf)| cipher.decrypt_available(black_box(&mut buf)),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Benchmark TLV8 encode/parse of an M4-sized pairing message.
fn bench_tlv(c: &mut Criterion) {
    let mut tlv = Tlv8::with_state(2);
    tlv.set(TlvType::Salt, vec![0x11; 16]);
    tlv.set(TlvType::PublicKey, vec![0x22; 384]);
    let encoded = tlv.encode();

    c.bench_function("tlv_encode_m2", |b| b.iter(|| black_box(&tlv).encode()));
    c.bench_function("tlv_parse_m2", |b| b.iter(|| Tlv8::parse(black_box(&encoded))));
}

/// Benchmark the accessory side of the SRP exchange (M2 + M4).
fn bench_srp_server(c: &mut Criterion) {
    let code = b"031-45-154";
    c.bench_function("srp_server_round", |b| {
        b.iter_batched(
            || {
                let server = SrpServer::new(PAIR_SETUP_IDENTITY, code);
                let client = SrpClient::new(PAIR_SETUP_IDENTITY, code);
                let proof = client
                    .process_challenge(&SrpChallenge {
                        salt: server.salt(),
                        server_public_key: server.public_key(),
                    })
                    .unwrap();
                (server, client.public_key(), proof.client_proof.clone())
            },
            |(server, a, m1)| server.verify_client(black_box(&a), black_box(&m1)),
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    bench_session_encryption,
    bench_session_decryption,
    bench_tlv,
    bench_srp_server,
);

criterion_main!(benches);
