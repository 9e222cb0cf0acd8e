use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, bail};

use notify_relay::transport::{
    MailTransport, SlackTransport, SlackWebhookConfig, SlackWebhookTransport, SmtpConfig,
    SmtpMailTransport, Unconfigured,
};
use notify_relay::{AdapterRegistry, Notifier, NotifyConfig, OptionSet};

const USAGE: &str = "usage: notify-relay [--channel mail|slack] [--to ADDR] [--subject TEXT] [--raw] [--force] [MESSAGE...]

Reads the message from stdin when none is given on the command line.";

/// Parsed command line.
#[derive(Debug, Default)]
struct Args {
    channel: Option<String>,
    options: OptionSet,
    force: bool,
    message: Vec<String>,
}

fn parse_args(mut argv: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut args = Args::default();
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--channel" | "-c" => args.channel = Some(value(&mut argv, &arg)?),
            "--to" => args.options.to = Some(value(&mut argv, &arg)?),
            "--subject" => args.options.subject = Some(value(&mut argv, &arg)?),
            "--raw" => args.options.raw = Some(true),
            "--force" | "-f" => args.force = true,
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            "--" => {
                args.message.extend(argv.by_ref());
            }
            flag if flag.starts_with("--") => bail!("unknown flag {flag}\n\n{USAGE}"),
            _ => args.message.push(arg),
        }
    }
    Ok(args)
}

fn value(argv: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<String> {
    argv.next()
        .with_context(|| format!("{flag} needs a value"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = parse_args(std::env::args().skip(1))?;

    let message = if args.message.is_empty() {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read message from stdin")?;
        buf.trim_end().to_string()
    } else {
        args.message.join(" ")
    };
    if message.is_empty() {
        bail!("nothing to send\n\n{USAGE}");
    }

    let config = NotifyConfig::from_env()?;

    let mail: Arc<dyn MailTransport> = match SmtpConfig::from_env()? {
        Some(smtp) => Arc::new(SmtpMailTransport::new(&smtp)?),
        None => {
            tracing::debug!("SMTP_HOST not set, mail channel unavailable");
            Arc::new(Unconfigured::new("smtp", "SMTP_HOST"))
        }
    };
    let slack: Arc<dyn SlackTransport> = match SlackWebhookConfig::from_env() {
        Some(webhook) => Arc::new(SlackWebhookTransport::new(webhook)),
        None => {
            tracing::debug!("SLACK_WEBHOOK_URL not set, Slack channel unavailable");
            Arc::new(Unconfigured::new("slack-webhook", "SLACK_WEBHOOK_URL"))
        }
    };

    let registry = AdapterRegistry::standard(mail, slack);
    let mut notifier = Notifier::new(config, registry)?;

    let channel = args.channel.as_deref();
    let delivered = if args.force {
        notifier.force(message, args.options, channel).await?
    } else {
        notifier.send(message, args.options, channel).await?
    };

    if delivered {
        eprintln!("Sent via {}", notifier.adapter_name());
    } else {
        eprintln!(
            "{} is disabled; nothing sent (use --force to override)",
            notifier.adapter_name()
        );
    }
    Ok(())
}
