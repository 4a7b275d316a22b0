//! `krosd`: the thin bootstrap binary around the `kros_core` library.
//! Builds a current-thread `tokio` runtime by hand rather than
//! `#[tokio::main]` so `main` can return a process
//! [`std::process::ExitCode`] matching the crate's own `Error` taxonomy
//! instead of bubbling to a generic failure.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use tokio::time::sleep;

use kros_core::arbitrator::Arbitrator;
use kros_core::bus::{MessageBus, Subscriber};
use kros_core::config::Config;
use kros_core::error::Error;
use kros_core::event::{Event, Group, Message};
use kros_core::macro_publisher::MacroPublisher;
use kros_core::motor::{Motor, MockMotorDriver};
use kros_core::motor_controller::MotorController;
use kros_core::orient::Orientation;
use kros_core::external_clock::ExternalClock;
use kros_core::component::{Component, Registry};
use kros_core::globals;

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to the YAML configuration document.
    #[arg(short = 'c', long = "config", default_value = "config.yaml")]
    config: String,
}

/// Forwards motion-related bus traffic into the [`Arbitrator`]:
/// motion-related subscribers hand payloads to the arbitrator. Everything
/// else on the bus (clock, macro, system, diagnostic events) has no
/// arbitrated controller and is simply acked.
struct ArbitratorBridge {
    name: String,
    arbitrator: Arc<Arbitrator>,
}

impl Subscriber for ArbitratorBridge {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, event: Event) -> bool {
        matches!(
            event.group(),
            Group::Velocity | Group::Chadburn | Group::Theta | Group::Stop | Group::Bumper | Group::Infrared
        )
    }

    fn on_message(&self, message: &Message) {
        self.arbitrator.submit(message.event, message.value);
    }
}

/// Drains the arbitrator at a fixed cadence, dispatching the
/// highest-priority pending payload to every registered controller each
/// pass. Arbitration happens off the bus's own consume loop, so a
/// backed-up arbitrator never stalls message delivery.
async fn run_arbitrator(arbitrator: Arc<Arbitrator>) {
    loop {
        while arbitrator.dispatch_next() {}
        sleep(Duration::from_millis(10)).await;
    }
}

fn run(config: Config) -> Result<(), Error> {
    kros_core::register_signals();

    let registry = Arc::new(Registry::new());

    let bus = Arc::new(MessageBus::new(config.kros.message_bus));
    registry.add(bus.name(), bus.classname())?;

    let arbitrator = Arc::new(Arbitrator::new());
    registry.add(arbitrator.name(), arbitrator.classname())?;

    let port = Motor::new(
        Orientation::Port,
        &config.kros.motors,
        1.0,
        Box::new(MockMotorDriver::default()),
    )?;
    let stbd = Motor::new(
        Orientation::Stbd,
        &config.kros.motors,
        1.0,
        Box::new(MockMotorDriver::default()),
    )?;
    let motor_controller = Arc::new(MotorController::new(config.kros.motors, port, stbd));
    motor_controller.enable();
    registry.add(motor_controller.name(), motor_controller.classname())?;
    registry.add(motor_controller.port().name(), motor_controller.port().classname())?;
    registry.add(motor_controller.stbd().name(), motor_controller.stbd().classname())?;
    arbitrator.register_controller(motor_controller.clone());

    bus.add_subscriber(Arc::new(ArbitratorBridge {
        name: "arbitrator-bridge".to_owned(),
        arbitrator: arbitrator.clone(),
    }));

    let macro_publisher_config = config.kros.publisher.macro_publisher.clone();
    let macro_publisher = Arc::new(MacroPublisher::new(macro_publisher_config, bus.clone()));
    registry.add(macro_publisher.name(), macro_publisher.classname())?;
    if config.kros.publisher.macro_publisher.load_macros {
        if let Some(path) = &config.kros.publisher.macro_publisher.macro_path {
            let loaded = macro_publisher.load_macro_files(path)?;
            info!("{}: loaded {loaded} macro file(s) from {path}", kros_core::NAME);
        }
    }

    let external_clock = Arc::new(ExternalClock::new(config.kros.publisher.external_clock));
    registry.add(external_clock.name(), external_clock.classname())?;
    {
        let motor_controller = motor_controller.clone();
        external_clock.add_callback(Arc::new(move || motor_controller.tick()));
    }
    external_clock.run();

    globals::put("registry", registry.clone())?;
    globals::put("bus", bus.clone())?;
    globals::put("arbitrator", arbitrator.clone())?;
    globals::put("macro_publisher", macro_publisher.clone())?;
    info!("{}", registry.print_registry().trim_end());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| Error::Other(e.to_string()))?;

    runtime.block_on(async {
        let bus_task = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.run().await })
        };
        let macro_task = {
            let macro_publisher = macro_publisher.clone();
            tokio::spawn(async move { macro_publisher.run().await })
        };
        let arbitrator_task = tokio::spawn(run_arbitrator(arbitrator.clone()));

        info!(
            "{} {}: running ({} cpu(s))",
            kros_core::NAME,
            kros_core::VERSION,
            kros_core::cpus()
        );

        while !kros_core::shutdown_requested() {
            sleep(Duration::from_millis(200)).await;
        }

        info!("{}: shutdown requested, stopping", kros_core::NAME);
        bus.initiate_shutdown();
        motor_controller.close();
        external_clock.state().close();

        let stop_timeout = Duration::from_secs_f64(config.core.stop_timeout.max(0.0));
        let _ = tokio::time::timeout(stop_timeout, bus_task).await;
        macro_task.abort();
        arbitrator_task.abort();
    });

    info!("{}: stopped after {:?} uptime", kros_core::NAME, kros_core::uptime());
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: failed to load configuration {}: {e}", kros_core::NAME, args.config);
            return ExitCode::from(e.exit_code() as u8);
        }
    };
    kros_core::init_logging(&config.logging);
    if let Err(e) = run(config) {
        error!("{}: fatal: {e}", kros_core::NAME);
        return ExitCode::from(e.exit_code() as u8);
    }
    ExitCode::SUCCESS
}
