use std::io::{stdout, Write};

use chat_client::compat::{Chat, RequestBuilder};
use chat_client::{stream, Config};
use clap::Parser;
use futures_util::StreamExt;

#[derive(Debug, clap::Parser)]
#[command(version, about = "Streamed chat completion", long_about = None)]
struct App {
    /// Chat endpoint base URL, e.g. http://localhost:8001/v1
    #[clap(long)]
    base_url: Option<String>,

    /// Bearer token; local servers accept any value
    #[clap(long)]
    api_key: Option<String>,

    #[clap(short, long)]
    model: Option<String>,

    #[clap(short, long)]
    system_message: Option<String>,

    #[clap(long, default_value_t = 128)]
    max_tokens: i32,

    #[clap(long, default_value_t = 0.7)]
    temperature: f32,

    #[clap(default_value = "Stream a short poem.")]
    user_message: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::init();

    let app = App::parse();
    let config = Config::read()?;
    let base_url = app.base_url.unwrap_or(config.base_url);
    let api_key = app.api_key.unwrap_or(config.api_key);

    let request = RequestBuilder::default()
        .messages(Chat::start_new(
            app.system_message.or(config.default_system_message),
            app.user_message,
        ))
        .model(app.model.unwrap_or(config.model))
        .max_tokens(app.max_tokens)
        .temperature(app.temperature)
        .stream(true)
        .build()?;

    let mut chunks = stream::completion(&base_url, &api_key, &request).await?;

    // Deltas go out as they arrive; framing is the caller's business.
    let mut out = stdout();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        if let Some(delta) = chunk.content() {
            write!(out, "{delta}")?;
            out.flush()?;
        }
    }

    Ok(())
}
