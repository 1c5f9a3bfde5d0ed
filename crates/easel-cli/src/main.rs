use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use easel_contracts::chat::{parse_intent, CHAT_HELP_COMMANDS};
use easel_contracts::classify::ErrorCategory;
use easel_contracts::events::EventWriter;
use easel_contracts::history::GenerationResult;
use easel_contracts::prompt::GenerationRequest;
use easel_contracts::styles::StyleCatalog;
use easel_contracts::ContractError;
use easel_engine::config::SETUP_INSTRUCTIONS;
use easel_engine::{ensure_png, ConfigError, GenerationError, Settings, Studio};
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "easel", version, about = "Text-to-image generation with style presets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the available styles and their modifiers.
    Styles,
    /// Generate one image and save it.
    Generate(GenerateArgs),
    /// Interactive session with history.
    Chat(ChatArgs),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    style: Option<String>,
    /// Send the prompt without the style modifier.
    #[arg(long)]
    no_style: bool,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, default_value = ".")]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    style: Option<String>,
    #[arg(long)]
    no_style: bool,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, default_value = ".")]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
}

const EXIT_REMOTE_FAILURE: i32 = 2;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            if let Some(ConfigError::MissingCredential) = err.downcast_ref::<ConfigError>() {
                print_setup_instructions();
            } else {
                eprintln!("easel error: {err:#}");
            }
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Styles => run_styles(),
        Command::Generate(args) => run_generate(args),
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
    }
}

fn run_styles() -> Result<i32> {
    let catalog = easel_engine::config::load_style_catalog()?;
    for entry in catalog.entries() {
        println!("{:<14} {}", entry.name, entry.modifier);
    }
    Ok(0)
}

fn open_studio(model: Option<String>, events: Option<&Path>) -> Result<Studio> {
    let settings = Settings::load()?;
    log::debug!("settings: {settings:?}");
    let model = model
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| settings.model.clone());
    let studio = Studio::new(settings.style_catalog()?, settings.provider_registry()?, model);
    Ok(match events {
        Some(path) => {
            studio.with_events(EventWriter::new(path, uuid::Uuid::new_v4().to_string()))
        }
        None => studio,
    })
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let mut studio = open_studio(args.model, args.events.as_deref())?;
    let style = resolve_style(studio.catalog(), args.style.as_deref())?;
    let request = GenerationRequest::new(args.prompt, style, !args.no_style);

    match submit_and_report(&mut studio, &request) {
        SubmitOutcome::Succeeded => {
            let saved = studio.save(None, &args.out)?;
            println!("Saved {}", saved.path.display());
            Ok(0)
        }
        SubmitOutcome::Rejected => Ok(1),
        SubmitOutcome::Failed => Ok(EXIT_REMOTE_FAILURE),
    }
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let mut studio = open_studio(args.model, args.events.as_deref())?;
    let mut style = resolve_style(studio.catalog(), args.style.as_deref())?;
    let mut apply_style = !args.no_style;
    let out_dir = args.out;

    let stdin = io::stdin();
    let mut line = String::new();

    println!("Easel chat started. Model: {}. Type /help for commands.", studio.model());
    print_style_caption(studio.catalog(), style.as_deref(), apply_style);

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(&line);
        match intent.action.as_str() {
            "noop" => {}
            "quit" => break,
            "help" => {
                println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
                println!("Anything else is sent as an image description.");
            }
            "list_styles" => {
                for entry in studio.catalog().entries() {
                    let marker = if style.as_deref() == Some(entry.name.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    println!("{marker} {:<14} {}", entry.name, entry.modifier);
                }
            }
            "set_style" => {
                let requested = value_as_non_empty_string(intent.command_args.get("style"));
                match requested.as_deref().map(|name| studio.catalog().resolve_name(name)) {
                    Some(Some(name)) => {
                        style = Some(name.to_string());
                        print_style_caption(studio.catalog(), style.as_deref(), apply_style);
                    }
                    Some(None) => println!(
                        "Unknown style. Available: {}",
                        studio.catalog().names().join(", ")
                    ),
                    None => println!("/style requires a name"),
                }
            }
            "enable_style" => {
                apply_style = true;
                print_style_caption(studio.catalog(), style.as_deref(), apply_style);
            }
            "disable_style" => {
                apply_style = false;
                println!("Style modifier disabled; prompts are sent as typed.");
            }
            "set_model" => {
                if let Some(model) = value_as_non_empty_string(intent.command_args.get("model")) {
                    studio.set_model(model.clone());
                    println!("Model set to {model}");
                } else {
                    println!("Current model: {}", studio.model());
                }
            }
            "show_prompt" => match studio.last_final_prompt() {
                Some(prompt) => println!("{prompt}"),
                None => println!("No prompt submitted yet."),
            },
            "list_history" => print_history(&studio),
            "clear_history" => {
                studio.clear_history();
                println!("History cleared.");
            }
            "save" => {
                let index = value_as_index(intent.command_args.get("index"));
                let dir = value_as_non_empty_string(intent.command_args.get("dir"))
                    .map(PathBuf::from)
                    .unwrap_or_else(|| out_dir.clone());
                match studio.save(index, &dir) {
                    Ok(saved) => println!("Saved {}", saved.path.display()),
                    Err(err) => println!("Save failed: {err:#}"),
                }
            }
            "reuse" => {
                let Some(index) = value_as_index(intent.command_args.get("index")) else {
                    println!("/reuse requires a history index");
                    continue;
                };
                let Some(request) = studio.reuse_request(index) else {
                    println!("No history entry at index {index}");
                    continue;
                };
                style = request.style_name.clone();
                apply_style = request.apply_style;
                submit_and_report(&mut studio, &request);
            }
            "generate" => {
                let prompt = intent.prompt.unwrap_or_default();
                let request = GenerationRequest::new(prompt, style.clone(), apply_style);
                submit_and_report(&mut studio, &request);
            }
            "unknown" => {
                let command = value_as_non_empty_string(intent.command_args.get("command"))
                    .unwrap_or_default();
                println!("Unknown command /{command}. Type /help for commands.");
            }
            other => log::debug!("unhandled intent {other}"),
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmitOutcome {
    Succeeded,
    Rejected,
    Failed,
}

fn submit_and_report(studio: &mut Studio, request: &GenerationRequest) -> SubmitOutcome {
    if let Ok(prompt) = studio.compose(request) {
        println!("Full prompt: {prompt}");
        println!("Generating your image... This may take 10-30 seconds");
    }
    match studio.submit(request) {
        Ok(result) => {
            println!("Image generated successfully!");
            print_result(result);
            SubmitOutcome::Succeeded
        }
        Err(GenerationError::Rejected(ContractError::EmptyPrompt)) => {
            println!("Please enter a description for your image");
            SubmitOutcome::Rejected
        }
        Err(GenerationError::Remote { category, failure }) => {
            print_failure(category, &failure.message);
            SubmitOutcome::Failed
        }
        Err(err) => {
            println!("{err}");
            SubmitOutcome::Rejected
        }
    }
}

fn print_result(result: &GenerationResult) {
    match ensure_png(&result.image_bytes) {
        Ok(png) => println!(
            "  \"{}\" {}x{} ({} bytes)",
            result.raw_prompt,
            png.width,
            png.height,
            result.image_bytes.len()
        ),
        Err(err) => println!(
            "  \"{}\" ({} bytes, not a readable image: {err:#})",
            result.raw_prompt,
            result.image_bytes.len()
        ),
    }
}

fn print_failure(category: ErrorCategory, message: &str) {
    match category {
        ErrorCategory::Unknown => println!("{}: {message}", category.headline()),
        _ => println!("{}", category.headline()),
    }
    for line in category.guidance() {
        println!("  - {line}");
    }
}

fn print_history(studio: &Studio) {
    if studio.history().is_empty() {
        println!("History is empty.");
        return;
    }
    for (idx, entry) in studio.history().all().enumerate() {
        println!(
            "[{idx}] {} {:<12} {}",
            entry.created_at.format("%H:%M:%S"),
            entry.style_name.as_deref().unwrap_or("-"),
            entry.raw_prompt
        );
    }
}

fn print_style_caption(catalog: &StyleCatalog, style: Option<&str>, apply_style: bool) {
    let Some(name) = style else {
        println!("No style selected.");
        return;
    };
    match catalog.lookup(name) {
        Ok(modifier) if apply_style => println!("Style: {name} (modifier: {modifier})"),
        Ok(_) => println!("Style: {name} (modifier disabled)"),
        Err(err) => println!("{err}"),
    }
}

fn print_setup_instructions() {
    eprintln!("HuggingFace API token not found!");
    eprintln!("Setup instructions:");
    for (idx, step) in SETUP_INSTRUCTIONS.iter().enumerate() {
        eprintln!("  {}. {step}", idx + 1);
    }
}

fn resolve_style(catalog: &StyleCatalog, requested: Option<&str>) -> Result<Option<String>> {
    match requested {
        Some(input) => match catalog.resolve_name(input) {
            Some(name) => Ok(Some(name.to_string())),
            None => bail!(
                "unknown style '{input}'. Available: {}",
                catalog.names().join(", ")
            ),
        },
        None => Ok(catalog.default_style().map(str::to_string)),
    }
}

fn value_as_non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn value_as_index(value: Option<&Value>) -> Option<usize> {
    value
        .and_then(Value::as_u64)
        .and_then(|value| usize::try_from(value).ok())
}
