use clap::{Arg, ArgAction, Command};
use redo::config::Config;
use redo::executor::{Executor, ShellProcessRunner};
use redo::history::ShellHistory;
use redo::recovery::RecoveryLoop;
use redo::selection::TerminalKeys;
use redo::suggestion::{GeminiSuggester, MockSuggester, SuggestionSource};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Exit code when no command was given (EX_USAGE).
const EXIT_USAGE: i32 = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("redo")
        .about("Run a shell command and pick a suggested fix when it fails")
        .long_about("redo runs the given command; if it fails, the error and recent shell history are sent to a language model and the suggested corrections can be run with a single keypress")
        .arg(Arg::new("command")
            .help("The command line to run")
            .num_args(1..)
            .trailing_var_arg(true)
            .allow_hyphen_values(true))
        .arg(Arg::new("set-api-key")
            .long("set-api-key")
            .help("Set the Gemini API key")
            .value_name("API_KEY")
            .num_args(1))
        .arg(Arg::new("config")
            .long("config")
            .help("Show configuration information")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("verbose")
            .short('v')
            .long("verbose")
            .help("Log progress to stderr")
            .action(ArgAction::SetTrue))
        .get_matches();

    let default_level = if matches.get_flag("verbose") { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Handle configuration commands
    if let Some(api_key) = matches.get_one::<String>("set-api-key") {
        let mut config = Config::load()?;
        config.set_api_key(api_key.clone())?;
        println!("✅ API key saved successfully");
        return Ok(());
    }

    if matches.get_flag("config") {
        Config::show_config_info()?;
        return Ok(());
    }

    let command_args: Vec<String> = matches
        .get_many::<String>("command")
        .unwrap_or_default()
        .map(|s| s.to_string())
        .collect();

    if command_args.is_empty() {
        eprintln!("No command provided. Use 'redo --help' for usage information.");
        std::process::exit(EXIT_USAGE);
    }

    let command = command_args.join(" ");
    info!("Initial command: {}", command);

    let config = Config::load()?;
    let suggester: Box<dyn SuggestionSource> = if config.is_mock_mode() {
        Box::new(MockSuggester::new(config.mock_reply.clone()))
    } else {
        Box::new(GeminiSuggester::from_config(&config))
    };
    let history = ShellHistory::discover(config.history_file.clone());
    let runner = match config.command_timeout() {
        Some(_) => ShellProcessRunner::new(&config.shell).in_own_process_group(),
        None => ShellProcessRunner::new(&config.shell),
    };

    let mut recovery = RecoveryLoop::new(
        Executor::new(runner, config.command_timeout()),
        &history,
        suggester.as_ref(),
        TerminalKeys::new(config.selection_timeout()),
        std::io::stdout(),
        std::io::stderr(),
    );

    let outcome = recovery.run(command).await?;
    std::process::exit(outcome.exit_code());
}
