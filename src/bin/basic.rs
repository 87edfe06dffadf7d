use anyhow::Context;
use chat_client::compat::{self, Chat, RequestBuilder};
use chat_client::Config;
use clap::Parser;

#[derive(Debug, clap::Parser)]
#[command(version, about = "One-shot chat completion", long_about = None)]
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

    #[clap(long, default_value_t = 64)]
    max_tokens: i32,

    #[clap(long, default_value_t = 0.7)]
    temperature: f32,

    /// Print the models the server offers instead of completing
    #[clap(long)]
    list_models: bool,

    #[clap(default_value = "Say hello in one sentence.")]
    user_message: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::init();

    let app = App::parse();
    let config = Config::read()?;
    let base_url = app.base_url.unwrap_or(config.base_url);
    let api_key = app.api_key.unwrap_or(config.api_key);

    if app.list_models {
        for model in compat::list_models(&base_url, &api_key).await? {
            println!("{model}");
        }
        return Ok(());
    }

    let request = RequestBuilder::default()
        .messages(Chat::start_new(
            app.system_message.or(config.default_system_message),
            app.user_message,
        ))
        .model(app.model.unwrap_or(config.model))
        .max_tokens(app.max_tokens)
        .temperature(app.temperature)
        .build()?;

    let response = compat::completion(&base_url, &api_key, &request).await?;
    let content = response
        .content()
        .context("response contained no choices")?;
    println!("{content}");

    Ok(())
}
