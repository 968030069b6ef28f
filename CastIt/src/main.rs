use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use castitconfig::{Config, get_config};
use castitcontrol::{CastController, ControlConfigExt, ControlEvent, DlnaController};
use castitdiscovery::{
    DiscoveryConfigExt, MdnsDiscovery, MdnsEvent, RendererEvent, SsdpDiscovery,
};
use clap::{Parser, Subcommand};
use crossbeam_channel::{Receiver, after, select};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "castit")]
#[command(version)]
#[command(about = "Discover Cast receivers and DLNA renderers, and cast local media to them", long_about = None)]
struct Cli {
    /// Configuration directory (defaults to $CASTIT_CONFIG, ./.castit, ~/.castit)
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for devices on the local network
    Discover {
        /// How long to listen, in seconds
        #[arg(long, default_value_t = 20)]
        seconds: u64,
    },
    /// Serve a local file and cast it to a Cast receiver
    Cast { device_ip: String, file: PathBuf },
    /// Cast a URL to a Cast receiver
    CastUrl { device_ip: String, url: String },
    /// Serve a local file and play it on a DLNA renderer
    Dlna { control_url: String, file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config_dir {
        Some(dir) => Arc::new(Config::load_config(dir).context("Cannot load configuration")?),
        None => get_config(),
    };
    init_tracing(&config);

    match cli.command {
        Command::Discover { seconds } => discover(&config, Duration::from_secs(seconds)),
        Command::Cast { device_ip, file } => {
            let mut cast = CastController::new(config.cast_settings(), config.responder_settings());
            let events = cast.subscribe();
            let result = cast.cast_file(&device_ip, &file);
            print_control_events(&events);
            result?;
            wait_for_enter("Casting, press Enter to stop...");
            cast.disconnect();
            Ok(())
        }
        Command::CastUrl { device_ip, url } => {
            let mut cast = CastController::new(config.cast_settings(), config.responder_settings());
            let events = cast.subscribe();
            let result = cast.cast_media(&device_ip, &url);
            print_control_events(&events);
            result?;
            cast.disconnect();
            Ok(())
        }
        Command::Dlna { control_url, file } => {
            let mut dlna = DlnaController::new(config.dlna_settings(), config.responder_settings());
            let events = dlna.subscribe();
            let result = dlna.cast_media(&control_url, &file);
            print_control_events(&events);
            result?;
            // Le renderer lit depuis notre serveur : il doit rester ouvert
            wait_for_enter("Serving media, press Enter to stop...");
            dlna.shutdown();
            Ok(())
        }
    }
}

fn init_tracing(config: &Config) {
    let level = config
        .get_log_min_level()
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase();
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .try_init();
}

fn discover(config: &Config, duration: Duration) -> Result<()> {
    let mut mdns = MdnsDiscovery::new(config.mdns_settings(), config.mdns_classifier());
    let mut ssdp = SsdpDiscovery::new(config.ssdp_settings(), config.description_fetcher());
    let mdns_events = mdns.subscribe();
    let ssdp_events = ssdp.subscribe();

    // Un driver peut échouer sans empêcher l'autre de tourner
    if let Err(e) = mdns.start() {
        warn!("⚠️ mDNS discovery unavailable: {}", e);
    }
    if let Err(e) = ssdp.start() {
        warn!("⚠️ SSDP discovery unavailable: {}", e);
    }
    info!("🔍 Listening for devices for {} s", duration.as_secs());

    let deadline = after(duration);
    let started = Instant::now();
    loop {
        select! {
            recv(mdns_events) -> event => match event {
                Ok(MdnsEvent::DeviceResolved(device)) => println!(
                    "Cast  {:<30} {}",
                    device.display_name(),
                    device.control_endpoint.as_deref().unwrap_or("-")
                ),
                Ok(MdnsEvent::DevicesUpdated(names)) => info!("Cast devices: {}", names.join(", ")),
                Ok(MdnsEvent::Failed(message)) => warn!("mDNS: {}", message),
                Err(_) => break,
            },
            recv(ssdp_events) -> event => match event {
                Ok(RendererEvent::RendererUrlsUpdated(urls)) => {
                    for (name, url) in urls {
                        println!("DLNA  {:<30} {}", name, url);
                    }
                }
                Ok(RendererEvent::RenderersUpdated(names)) => info!("DLNA renderers: {}", names.join(", ")),
                Ok(RendererEvent::Failed(message)) => warn!("SSDP: {}", message),
                Err(_) => break,
            },
            recv(deadline) -> _ => break,
        }
    }

    mdns.stop();
    ssdp.stop();
    info!("Discovery finished after {:.1} s", started.elapsed().as_secs_f32());
    Ok(())
}

fn print_control_events(events: &Receiver<ControlEvent>) {
    for event in events.try_iter() {
        match event {
            ControlEvent::Status(message) => println!("✅ {}", message),
            ControlEvent::Error(message) => eprintln!("❌ {}", message),
        }
    }
}

fn wait_for_enter(prompt: &str) {
    println!("{}", prompt);
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
}
