use anyhow::{Context, anyhow};
use chipper_app::{ChipperApp, init_logging};
use chipper_core::AgentId;
use chipper_core::config::Config;
use chipper_core::sync::TaskChannel;
use log::{error, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use sandbox::{Simulation, generate_forest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinSet;

const AGENT: AgentId = AgentId(1);
const TICK: Duration = Duration::from_millis(50);
/// Two minutes of world time.
const RUN_TICKS: u64 = 2400;
const TREES: usize = 40;

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("Simulation lock poisoned")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let seed = std::env::args()
        .nth(1)
        .map(|arg| arg.parse::<u64>())
        .transpose()
        .context("The seed must be an unsigned integer")?
        .unwrap_or_else(rand::random);
    info!("Sandbox seed {}", seed);

    let mut rng = StdRng::seed_from_u64(seed);
    let sim = Arc::new(RwLock::new(Simulation::new(
        generate_forest(&mut rng, TREES),
        AGENT,
    )));

    let mut app = ChipperApp::new(Config::default())?;
    app.reactive().add_agent(AGENT);
    {
        let mut guard = sim.write().map_err(poisoned)?;
        let Simulation {
            body, interaction, ..
        } = &mut *guard;
        let feedback = app.reactive().execute("chipper start", body, interaction)?;
        info!("{}", feedback);
    }
    let channel = app.channel().clone();
    let (mut reactive, mut task_loop) = app.into_loops();
    let running = Arc::new(AtomicBool::new(true));

    let mut join_set = JoinSet::new();

    let task_sim = Arc::clone(&sim);
    let task_running = Arc::clone(&running);
    join_set.spawn(async move {
        let mut interval = tokio::time::interval(TICK);
        for _ in 0..RUN_TICKS {
            interval.tick().await;
            if !task_running.load(Ordering::Relaxed) {
                break;
            }
            let mut sim = task_sim.write().map_err(poisoned)?;
            let body = sim.body;
            for (_, rotation) in task_loop.tick(&sim.world, &[body]) {
                sim.set_rotation(rotation);
            }
        }
        Ok::<_, anyhow::Error>("Task loop")
    });

    let reactive_sim = Arc::clone(&sim);
    let reactive_running = Arc::clone(&running);
    join_set.spawn(async move {
        let mut interval = tokio::time::interval(TICK);
        for _ in 0..RUN_TICKS {
            interval.tick().await;
            if !reactive_running.load(Ordering::Relaxed) {
                break;
            }
            let mut guard = reactive_sim.write().map_err(poisoned)?;
            let Simulation {
                world,
                body,
                interaction,
                ..
            } = &mut *guard;
            reactive.tick(&*world, &*body, interaction)?;
            let intents = reactive
                .controller(AGENT)
                .map(|controller| *controller.intents())
                .unwrap_or_default();
            guard.step(&intents);
            if guard.logs_left() == 0 {
                info!("Every log in the forest is down");
                reactive_running.store(false, Ordering::Relaxed);
            }
        }
        Ok::<_, anyhow::Error>("Reactive loop")
    });

    let ctrl_c_running = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping both loops");
            ctrl_c_running.store(false, Ordering::Relaxed);
        }
    });

    while let Some(result) = join_set.join_next().await {
        match result {
            Ok(Ok(name)) => info!("{} finished", name),
            Ok(Err(e)) => {
                error!("Loop failed: {}", e);
                running.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                error!("Loop task panicked: {}", e);
                running.store(false, Ordering::Relaxed);
            }
        }
    }

    let sim = sim.read().map_err(poisoned)?;
    info!("Final status: {}", channel.status(AGENT));
    info!(
        "Logs left: {}, items collected: {}",
        sim.logs_left(),
        sim.collected
    );
    Ok(())
}
