//! Built-in demo accessories and their simulated behaviour.

use crate::definition::Definition;
use anyhow::Result;
use clap::ValueEnum;
use hap_core::{AccessoryGraph, Category, Value, PRIMARY_AID};
use hap_server::AccessoryServer;
use rand::Rng;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const THERMOSTAT: &str = include_str!("../demos/thermostat.json");
const BRIDGE: &str = include_str!("../demos/bridge.json");

const TICK: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    /// Heating thermostat that drifts toward its target.
    Thermostat,
    /// Bridge with a light, a switch and a garden sensor.
    Bridge,
    /// Lone temperature sensor with noisy readings.
    Temperature,
}

impl Demo {
    pub fn category(self) -> Category {
        match self {
            Demo::Thermostat => Category::Thermostat,
            Demo::Bridge => Category::Bridge,
            Demo::Temperature => Category::Sensor,
        }
    }

    pub fn graph(self) -> Result<AccessoryGraph> {
        match self {
            Demo::Thermostat => Definition::from_json(THERMOSTAT)?.build(),
            Demo::Bridge => Definition::from_json(BRIDGE)?.build(),
            Demo::Temperature => Definition::from_json(
                r#"{"accessories":[{"name":"Temperature Sensor","category":"sensor",
                    "services":[{"type":"TemperatureSensor",
                                 "values":{"CurrentTemperature":21.0}}]}]}"#,
            )?
            .build(),
        }
    }

    /// Start the background simulation for this demo.
    pub fn simulate(self, server: &AccessoryServer) -> Option<JoinHandle<()>> {
        let server = server.clone();
        match self {
            Demo::Thermostat => Some(tokio::spawn(thermostat(server))),
            Demo::Temperature => Some(tokio::spawn(sensor(server, PRIMARY_AID))),
            Demo::Bridge => {
                let aid = server
                    .database()
                    .accessories()
                    .iter()
                    .find(|a| a.name() == "Garden Sensor")
                    .and_then(|a| a.aid())?;
                Some(tokio::spawn(sensor(server, aid)))
            }
        }
    }
}

fn iid(server: &AccessoryServer, aid: u64, name: &str) -> Option<u64> {
    server
        .database()
        .accessories()
        .iter()
        .find(|a| a.aid() == Some(aid))?
        .characteristics()
        .find(|c| c.name() == name)
        .map(|c| c.iid())
}

fn read_f64(server: &AccessoryServer, aid: u64, iid: u64) -> Option<f64> {
    server.database().resolve(aid, iid).ok()?.value().as_f64()
}

fn update(server: &AccessoryServer, aid: u64, iid: u64, value: impl Into<Value>) {
    if let Err(e) = server.set_value(aid, iid, value) {
        warn!(aid, iid, error = %e, "Simulated update rejected");
    }
}

/// Move the room temperature half a degree per tick toward the target
/// while heating or cooling.
async fn thermostat(server: AccessoryServer) {
    let aid = PRIMARY_AID;
    let (Some(current), Some(target), Some(mode), Some(state)) = (
        iid(&server, aid, "CurrentTemperature"),
        iid(&server, aid, "TargetTemperature"),
        iid(&server, aid, "TargetHeatingCoolingState"),
        iid(&server, aid, "CurrentHeatingCoolingState"),
    ) else {
        warn!("Thermostat demo is missing characteristics");
        return;
    };

    let mut ticker = tokio::time::interval(TICK);
    loop {
        ticker.tick().await;
        let (Some(now), Some(goal), Some(mode)) = (
            read_f64(&server, aid, current),
            read_f64(&server, aid, target),
            read_f64(&server, aid, mode),
        ) else {
            continue;
        };

        let (next, heating_cooling) = step_toward(now, goal, mode as u8);
        debug!(now, goal, next, "Thermostat tick");
        update(&server, aid, current, next);
        update(&server, aid, state, heating_cooling);
    }
}

/// Next room temperature and CurrentHeatingCoolingState for `mode`
/// (0 off, 1 heat, 2 cool, 3 auto).
fn step_toward(now: f64, goal: f64, mode: u8) -> (f64, u8) {
    let heat = matches!(mode, 1 | 3) && now < goal;
    let cool = matches!(mode, 2 | 3) && now > goal;
    let next = if heat {
        (now + 0.5).min(goal)
    } else if cool {
        (now - 0.5).max(goal)
    } else {
        now
    };
    let state = if heat {
        1
    } else if cool {
        2
    } else {
        0
    };
    ((next * 10.0).round() / 10.0, state)
}

/// Random walk of a temperature sensor.
async fn sensor(server: AccessoryServer, aid: u64) {
    let Some(current) = iid(&server, aid, "CurrentTemperature") else {
        warn!(aid, "No temperature sensor to simulate");
        return;
    };

    let mut ticker = tokio::time::interval(TICK);
    loop {
        ticker.tick().await;
        let Some(now) = read_f64(&server, aid, current) else {
            continue;
        };
        let delta: f64 = rand::thread_rng().gen_range(-0.3..=0.3);
        let next = ((now + delta).clamp(-10.0, 40.0) * 10.0).round() / 10.0;
        update(&server, aid, current, next);
    }
}
