mod cli;

use std::io;
use std::thread;

use anyhow::Result;
use cadence_backend::rt_processing::CancellationToken;
use cadence_backend::{AudioHost, DeviceEnumerator, render_simulated, render_to_device};
use cadence_core::{AudioFormat, SampleEncoding};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::Command;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run() {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    match cli::parse(std::env::args().skip(1))? {
        Command::Help => println!("{}", cli::USAGE),
        Command::ListDevices => {
            let host = AudioHost::acquire()?;
            DeviceEnumerator::scan(&host)?.print_device_list();
        }
        Command::Render { config, simulate } => {
            let cancel = cancel_on_enter()?;
            let report = if simulate {
                let format = AudioFormat::new(SampleEncoding::Float32, 2, 48_000)?;
                info!(%format, "simulating output device");
                render_simulated(&config, format, cancel)?
            } else {
                render_to_device(&config, cancel)?
            };
            println!("{report}");
        }
    }
    Ok(())
}

/// Cancel the session when a line arrives on stdin. End of input (stdin closed
/// or redirected from nothing) leaves the session running.
fn cancel_on_enter() -> Result<CancellationToken> {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    thread::Builder::new()
        .name("stdin-cancel".into())
        .spawn(move || {
            let mut line = String::new();
            if let Ok(1..) = io::stdin().read_line(&mut line) {
                info!("stopping playback");
                trigger.cancel();
            }
        })?;
    info!("press Enter to stop");
    Ok(cancel)
}
