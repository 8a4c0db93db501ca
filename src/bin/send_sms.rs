use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, error::ErrorKind};
use sms_core::{ModemStatus, SendRequest};
use sms_teltonika::RouterClient;
use smsgate::config::{AppConfig, Overrides};
use smsgate::logging::init_logging;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "send-sms")]
#[command(author, version, about = "Send SMS via Teltonika router")]
#[command(after_help = "Examples:
  send-sms +491234567890 \"Test message\"
  send-sms +491234567890 \"Test\" --modem 1-1.4
  send-sms --list-modems
  send-sms +491234567890 \"Test\" --router https://192.168.1.1 --user admin --password secret")]
struct Args {
    /// Recipient phone number (e.g. +491234567890), required except with --list-modems
    phone_number: Option<String>,

    /// SMS message to send, required except with --list-modems
    message: Option<String>,

    /// Modem ID; the primary modem is used when omitted
    #[arg(long)]
    modem: Option<String>,

    /// Show available modems and exit
    #[arg(long)]
    list_modems: bool,

    /// Router URL (env: TRB245_ROUTER)
    #[arg(long, value_name = "URL")]
    router: Option<String>,

    /// Username (env: TRB245_USER)
    #[arg(long)]
    user: Option<String>,

    /// Password (env: TRB245_PASSWORD)
    #[arg(long)]
    password: Option<String>,

    /// Path to config file (default: ./config.yaml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Send long messages in one piece instead of splitting them
    #[arg(long)]
    no_split: bool,

    /// Maximum characters per SMS including numbering
    #[arg(long, value_name = "N")]
    max_length: Option<usize>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            config_path: self.config.clone(),
            router_url: self.router.clone(),
            username: self.user.clone(),
            password: self.password.clone(),
            max_length: self.max_length,
            ..Overrides::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("✗ Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = AppConfig::load(&args.overrides()).context("loading configuration")?;
    init_logging(&config.logging)?;

    if !args.list_modems && (args.phone_number.is_none() || args.message.is_none()) {
        Args::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "phone_number and message are required (or use --list-modems)",
            )
            .exit();
    }

    let settings = config.router.settings()?;
    let mut client = RouterClient::new(&settings)?;

    if let Err(e) = client.try_authenticate(false).await {
        eprintln!("✗ Authentication failed: {}", e.detail());
        eprintln!("  Please check credentials.");
        return Ok(ExitCode::FAILURE);
    }

    if args.list_modems {
        print_modems(client.get_modems().await.as_ref());
        return Ok(ExitCode::SUCCESS);
    }

    let (Some(phone_number), Some(message)) = (&args.phone_number, &args.message) else {
        return Ok(ExitCode::FAILURE);
    };

    let modem = match &args.modem {
        Some(modem) => modem.clone(),
        None => {
            let discovered = client.get_modems().await;
            let modem = choose_modem(discovered.as_ref(), &settings.default_modem);
            println!("ℹ Using modem: {modem}");
            modem
        }
    };

    let mut request = SendRequest::new(phone_number, message)
        .via_modem(&modem)
        .with_split(config.split_options());
    if args.no_split {
        request = request.without_splitting();
    }

    info!(modem = %modem, length = message.chars().count(), "sending SMS");
    match client.send_sms(request).await {
        Ok(report) if report.is_multipart() => {
            println!(
                "✓ All {} SMS parts sent successfully! (Total: {} SMS)",
                report.parts, report.sms_used
            );
            Ok(ExitCode::SUCCESS)
        }
        Ok(report) => {
            println!("✓ SMS sent successfully! (SMS used: {})", report.sms_used);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("✗ SMS sending failed: {}", e.detail());
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Primary or first listed modem, else the configured default.
fn choose_modem(discovered: Option<&ModemStatus>, default_modem: &str) -> String {
    discovered
        .and_then(ModemStatus::select_modem)
        .unwrap_or(default_modem)
        .to_string()
}

fn print_modems(status: Option<&ModemStatus>) {
    println!("Available modems:");
    println!("{}", "-".repeat(80));
    let Some(status) = status.filter(|s| s.success) else {
        println!("  ✗ Could not retrieve modem list.");
        return;
    };
    for modem in &status.data {
        println!("  ID: {}", modem.id.as_deref().unwrap_or("unknown"));
        println!(
            "    Name: {}{}",
            modem.name.as_deref().unwrap_or("Unnamed"),
            if modem.primary { " (Primary)" } else { "" }
        );
        println!("    Status: {}", modem.state.as_deref().unwrap_or("unknown"));
        println!("    Operator: {}", modem.operator.as_deref().unwrap_or(""));
        if let Some(model) = modem.model.as_deref().filter(|m| !m.is_empty()) {
            println!("    Model: {model}");
        }
        println!();
    }
}
