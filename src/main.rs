use anyhow::Context;
use argh::FromArgs;
use my_little_shell::Interpreter;
use my_little_shell::builtin::Exit;
use my_little_shell::registry::Registry;
use my_little_shell::session::Session;

/// A small interactive shell with pipelines and a handful of builtins.
#[derive(FromArgs)]
struct Options {
    /// run a single line and exit with its status
    #[argh(option, short = 'c')]
    command: Option<String>,

    /// log level used when RUST_LOG is not set
    #[argh(option, default = "String::from(\"warn\")")]
    log_level: String,

    /// enable the `exit` builtin
    #[argh(switch)]
    allow_exit: bool,
}

fn main() -> anyhow::Result<()> {
    let options: Options = argh::from_env();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&options.log_level)),
        )
        .init();

    let mut registry = Registry::with_builtins(Session::new().into_handle());
    if options.allow_exit {
        registry.register::<Exit>();
    }
    let mut interpreter = Interpreter::new(registry);

    if let Some(line) = options.command {
        let status = interpreter.eval_and_print(&line);
        let code = interpreter.exit_requested().unwrap_or(status);
        std::process::exit(code);
    }

    if let Some(code) = interpreter.repl().context("terminal error")? {
        std::process::exit(code);
    }
    Ok(())
}
