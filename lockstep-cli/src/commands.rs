//! CLI command implementations

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use lockstep_core::config::LockstepConfig;
use lockstep_core::events::{BusError, EventBus, EventListener, SimulationEvent, TracingListener};
use lockstep_core::simulation::{
    DiningPhilosophersSimulation, ProducerConsumerSimulation, ReaderWriterSimulation, Simulation,
};

/// Options shared by every simulation run.
#[derive(Args)]
pub struct RunArgs {
    /// How long to run before stopping, in seconds
    #[arg(long, default_value = "10")]
    duration: u64,

    /// Speed factor applied to simulated delays (2.0 = half real speed)
    #[arg(long)]
    speed: Option<f64>,

    /// Emit events as JSON lines on stdout instead of tracing logs
    #[arg(long)]
    json: bool,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the bounded-buffer producer/consumer simulation
    ProducerConsumer {
        /// Number of producer workers
        #[arg(short, long, default_value = "2")]
        producers: usize,
        /// Number of consumer workers
        #[arg(short, long, default_value = "2")]
        consumers: usize,
        /// Buffer capacity
        #[arg(short = 'k', long, default_value = "5")]
        capacity: usize,
        /// Milliseconds to produce one item
        #[arg(long, default_value = "1000")]
        production_ms: u64,
        /// Milliseconds to consume one item
        #[arg(long, default_value = "1500")]
        consumption_ms: u64,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Run the dining philosophers simulation
    DiningPhilosophers {
        /// Number of philosophers around the table
        #[arg(short = 'n', long, default_value = "5")]
        philosophers: usize,
        /// Milliseconds spent thinking
        #[arg(long, default_value = "2000")]
        thinking_ms: u64,
        /// Milliseconds spent eating
        #[arg(long, default_value = "1000")]
        eating_ms: u64,
        /// Disable the odd-philosopher order swap that avoids deadlock
        #[arg(long)]
        no_avoidance: bool,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Run the reader-writer simulation
    ReaderWriter {
        /// Number of reader workers
        #[arg(short, long, default_value = "3")]
        readers: usize,
        /// Number of writer workers
        #[arg(short, long, default_value = "2")]
        writers: usize,
        /// Milliseconds per read
        #[arg(long, default_value = "1000")]
        read_ms: u64,
        /// Milliseconds per write
        #[arg(long, default_value = "2000")]
        write_ms: u64,
        /// Block new readers while any writer is waiting
        #[arg(long)]
        writer_priority: bool,
        #[command(flatten)]
        run: RunArgs,
    },
}

/// Prints each event as one JSON object per line.
struct JsonListener;

impl EventListener for JsonListener {
    fn on_event(&self, event: Arc<SimulationEvent>) -> Result<(), BusError> {
        let line = serde_json::to_string(&*event).map_err(|error| BusError::ListenerFailed {
            reason: error.to_string(),
        })?;
        println!("{line}");
        Ok(())
    }
}

/// Dispatches a CLI command to the corresponding simulation run.
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::ProducerConsumer {
            producers,
            consumers,
            capacity,
            production_ms,
            consumption_ms,
            run,
        } => {
            let mut config = LockstepConfig::from_env();
            apply_speed(&mut config, &run);
            config.producer_consumer.producers = producers;
            config.producer_consumer.consumers = consumers;
            config.producer_consumer.capacity = capacity;
            config.producer_consumer.production_delay = Duration::from_millis(production_ms);
            config.producer_consumer.consumption_delay = Duration::from_millis(consumption_ms);

            let bus = attach_listeners(&run);
            let simulation = ProducerConsumerSimulation::new(
                Arc::clone(&bus),
                config.producer_consumer,
                config.timing,
            );
            run_simulation(&simulation, &run).await;

            tracing::info!(
                produced = simulation.produced(),
                consumed = simulation.consumed(),
                occupancy = simulation.occupancy(),
                "producer/consumer finished"
            );
            bus.shutdown().await;
        }
        Commands::DiningPhilosophers {
            philosophers,
            thinking_ms,
            eating_ms,
            no_avoidance,
            run,
        } => {
            let mut config = LockstepConfig::from_env();
            apply_speed(&mut config, &run);
            config.dining.thinking_delay = Duration::from_millis(thinking_ms);
            config.dining.eating_delay = Duration::from_millis(eating_ms);
            config.dining.deadlock_avoidance = !no_avoidance;

            let bus = attach_listeners(&run);
            let simulation =
                DiningPhilosophersSimulation::new(Arc::clone(&bus), config.dining, config.timing);
            simulation
                .set_philosophers(philosophers)
                .map_err(|error| anyhow::anyhow!(error))?;
            run_simulation(&simulation, &run).await;

            tracing::info!(
                events = bus.history().len(),
                "dining philosophers finished"
            );
            bus.shutdown().await;
        }
        Commands::ReaderWriter {
            readers,
            writers,
            read_ms,
            write_ms,
            writer_priority,
            run,
        } => {
            let mut config = LockstepConfig::from_env();
            apply_speed(&mut config, &run);
            config.reader_writer.readers = readers;
            config.reader_writer.writers = writers;
            config.reader_writer.read_delay = Duration::from_millis(read_ms);
            config.reader_writer.write_delay = Duration::from_millis(write_ms);
            config.reader_writer.writer_priority = writer_priority;

            let bus = attach_listeners(&run);
            let simulation = ReaderWriterSimulation::new(
                Arc::clone(&bus),
                config.reader_writer,
                config.timing,
            );
            run_simulation(&simulation, &run).await;

            tracing::info!(
                total_reads = simulation.total_reads(),
                total_writes = simulation.total_writes(),
                "reader/writer finished"
            );
            bus.shutdown().await;
        }
    }

    Ok(())
}

fn apply_speed(config: &mut LockstepConfig, run: &RunArgs) {
    if let Some(speed) = run.speed {
        if speed > 0.0 {
            config.timing.speed_factor = speed;
        }
    }
}

fn attach_listeners(run: &RunArgs) -> Arc<EventBus> {
    let bus = Arc::new(EventBus::new());
    if run.json {
        bus.add_listener(Box::new(JsonListener));
    } else {
        bus.add_listener(Box::new(TracingListener::new()));
    }
    bus
}

async fn run_simulation(simulation: &dyn Simulation, run: &RunArgs) {
    tracing::info!(name = simulation.name(), duration = run.duration, "starting");
    simulation.start().await;
    tokio::time::sleep(Duration::from_secs(run.duration)).await;
    simulation.stop().await;
}
