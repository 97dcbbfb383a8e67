use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use futures::StreamExt;
use inferoxy_chat::{
    init_logging, submit, ChatMessage, ChatResponder, ClientConfig, GenerationParams,
    HttpTokenProxy, HuggingFaceFactory,
};
use std::fs;
use std::io::{self, Write};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let defaults = GenerationParams::default();
    let matches = Command::new("inferoxy-chat")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Stream one chat turn through an HF-Inferoxy token proxy")
        .arg(
            Arg::new("message")
                .long("message")
                .short('m')
                .value_name("TEXT")
                .help("User message to send")
                .required(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("history-file")
                .long("history-file")
                .value_name("FILE")
                .help("JSON array of {role, content} messages")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("system")
                .long("system")
                .value_name("TEXT")
                .default_value("You are a helpful assistant.")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("model")
                .long("model")
                .value_name("MODEL[:PROVIDER]")
                .default_value("openai/gpt-oss-20b")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("max-tokens")
                .long("max-tokens")
                .value_parser(clap::value_parser!(u32))
                .default_value("512")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("temperature")
                .long("temperature")
                .value_parser(clap::value_parser!(f32))
                .default_value("0.7")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("top-p")
                .long("top-p")
                .value_parser(clap::value_parser!(f32))
                .default_value("0.95")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("JSON config file; defaults to PROXY_KEY / PROXY_URL / HF_ROUTER_URL")
                .action(ArgAction::Set),
        )
        .get_matches();

    let config = match matches.get_one::<String>("config") {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::from_env()?,
    };

    let history: Vec<ChatMessage> = match matches.get_one::<String>("history-file") {
        Some(path) => {
            let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path))?
        }
        None => Vec::new(),
    };

    let params = GenerationParams {
        max_tokens: *matches.get_one::<u32>("max-tokens").unwrap_or(&defaults.max_tokens),
        temperature: *matches.get_one::<f32>("temperature").unwrap_or(&defaults.temperature),
        top_p: *matches.get_one::<f32>("top-p").unwrap_or(&defaults.top_p),
    };

    let proxy = Arc::new(HttpTokenProxy::new(&config.proxy)?);
    let providers = Arc::new(HuggingFaceFactory::new(&config.inference));
    let responder = ChatResponder::new(config, proxy, providers);

    let message = matches
        .get_one::<String>("message")
        .context("--message is required")?;
    let system = matches
        .get_one::<String>("system")
        .context("--system has a default")?;
    let model = matches
        .get_one::<String>("model")
        .context("--model has a default")?;

    let mut states = submit(&responder, message, history, system, model, params);
    let mut stdout = io::stdout();
    while let Some((history, _compose)) = states.next().await {
        let output = serde_json::json!({ "history": history });
        writeln!(stdout, "{}", serde_json::to_string(&output)?)?;
        stdout.flush()?;
    }

    Ok(())
}
