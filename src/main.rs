use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::config::Credentials;
use self::drivers::{DispatchOpts, Dispatcher};
use self::extract::{Extractor, tesseract::TesseractOcr};
use self::lifecycle::Controller;
use self::prelude::*;
use self::registry::Registry;
use self::session::SessionStore;
use self::telegram::Telegram;

mod config;
mod drivers;
mod errors;
mod extract;
mod lifecycle;
mod prelude;
mod registry;
mod session;
mod telegram;

/// Answer photographed questions over Telegram.
///
/// Send the bot a photo of a written question; it extracts the text with
/// OCR, lets you pick an AI model, and replies with the answer.
#[derive(Debug, Parser)]
#[clap(
    version,
    after_help = r#"
Environment Variables:
  - TELEGRAM_TOKEN: The Telegram bot token (required).
  - OPENAI_API_KEY (optional): Enables the OpenAI models.
  - OPENAI_API_BASE (optional): Override the OpenAI server URL.
  - GROQ_API_KEY (optional): Enables the Groq models.
  - GEMINI_API_KEY (optional): Enables Google Gemini.

  These variables may be set in a standard `.env` file.

The `tesseract` CLI tool must be installed and on PATH.
"#
)]
struct Opts {
    #[clap(flatten)]
    dispatch: DispatchOpts,
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    // We can stack multiple layers here if we need to.
    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main().await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main() -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    let credentials = Credentials::from_env();
    let token = credentials.require_telegram_token()?;

    let registry = Registry::new(&credentials);
    let available: Vec<&str> = registry.list_available().map(|desc| desc.id).collect();
    if available.is_empty() {
        warn!("no provider credentials configured; the model menu will be empty");
    } else {
        info!("available providers: {}", available.join(", "));
    }

    let controller = Arc::new(Controller::new(
        registry,
        Arc::new(SessionStore::new()),
        Dispatcher::new(&credentials, opts.dispatch.clone()),
        Extractor::new(Arc::new(TesseractOcr::new())),
    ));
    let telegram = Arc::new(Telegram::new(token)?);
    telegram.run(controller).await
}
