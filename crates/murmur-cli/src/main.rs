#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::OutputMode;
use std::env;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "mm",
    author,
    version,
    about = "murmur: anonymous feedback board",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output (same as `--format json`).
    #[arg(long, global = true)]
    json: bool,

    /// Output format: pretty, text, or json.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Act as this anonymous identity instead of the stored one.
    #[arg(long = "as", global = true, value_name = "IDENTITY")]
    as_identity: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }

    fn as_flag(&self) -> Option<&str> {
        self.as_identity.as_deref()
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Create a board",
        long_about = "Create a .murmur/ board (config and database) in the current directory.",
        after_help = "EXAMPLES:\n    # Create a board here\n    mm init\n\n    # Rewrite config and re-run migrations\n    mm init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Board",
        about = "Publish an anonymous post",
        long_about = "Publish a post. Content is trimmed and limited to 2000 characters.",
        after_help = "EXAMPLES:\n    # Post a message\n    mm post \"Can we move standup to 10?\"\n\n    # Emit machine-readable output\n    mm post \"Coffee machine is broken\" --json"
    )]
    Post(cmd::post::PostArgs),

    #[command(
        next_help_heading = "Board",
        about = "Show the feed",
        long_about = "List posts with reaction counts; your own reactions are starred.",
        after_help = "EXAMPLES:\n    # Newest first\n    mm list\n\n    # Most popular first\n    mm list --sort hot -n 10\n\n    # Next page\n    mm list --after 1760000000000000:mm-00ab12cd34ef5678"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Board",
        about = "Toggle a reaction",
        long_about = "Toggle upvote, downvote, or laugh on a post. Upvote and downvote replace each other.",
        after_help = "EXAMPLES:\n    # Upvote (run again to take it back)\n    mm react mm-00ab12cd34ef5678 upvote\n\n    # Laugh\n    mm react mm-00ab12cd34ef5678 laugh"
    )]
    React(cmd::react::ReactArgs),

    #[command(
        next_help_heading = "Admin",
        about = "Delete a post",
        long_about = "Delete a post and all of its reactions. Requires the admin secret.",
        after_help = "EXAMPLES:\n    # Delete with the secret from MURMUR_ADMIN_SECRET\n    mm delete mm-00ab12cd34ef5678 --secret \"$MURMUR_ADMIN_SECRET\""
    )]
    Delete(cmd::delete::DeleteArgs),

    #[command(
        next_help_heading = "Admin",
        about = "Check reaction counters",
        long_about = "Recompute counters from reaction entries and report drift and up/down conflicts.",
        after_help = "EXAMPLES:\n    # Report only (non-zero exit on drift)\n    mm audit\n\n    # Fix what is found\n    mm audit --repair"
    )]
    Audit(cmd::audit::AuditArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Show your anonymous identity",
        after_help = "EXAMPLES:\n    mm whoami"
    )]
    Whoami,

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    mm completions bash > ~/.local/share/bash-completion/completions/mm"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("MURMUR_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "murmur=debug,info"
        } else {
            "murmur=info,warn"
        })
    });

    let format = env::var("MURMUR_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_root = env::current_dir()?;
    let output = cli.output_mode();

    match cli.command {
        Commands::Init(ref args) => cmd::init::run_init(args, output, &project_root),
        Commands::Post(ref args) => cmd::post::run_post(args, output, &project_root),
        Commands::List(ref args) => {
            cmd::list::run_list(args, cli.as_flag(), output, &project_root)
        }
        Commands::React(ref args) => {
            cmd::react::run_react(args, cli.as_flag(), output, &project_root)
        }
        Commands::Delete(ref args) => cmd::delete::run_delete(args, output, &project_root),
        Commands::Audit(ref args) => cmd::audit::run_audit(args, output, &project_root),
        Commands::Whoami => cmd::whoami::run_whoami(cli.as_flag(), output),
        Commands::Completions(ref args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args, &mut command)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_parses_before_and_after_subcommand() {
        let cli = Cli::parse_from(["mm", "--json", "list"]);
        assert!(cli.json);
        let cli = Cli::parse_from(["mm", "list", "--json"]);
        assert!(cli.json);
        assert!(cli.output_mode().is_json());
    }

    #[test]
    fn format_flag_parses() {
        let cli = Cli::parse_from(["mm", "--format", "text", "list"]);
        assert_eq!(cli.format, Some(OutputMode::Text));
        assert_eq!(cli.output_mode(), OutputMode::Text);
    }

    #[test]
    fn as_flag_parsed() {
        let cli = Cli::parse_from(["mm", "react", "mm-1", "up", "--as", "tester"]);
        assert_eq!(cli.as_flag(), Some("tester"));
        let cli = Cli::parse_from(["mm", "list"]);
        assert!(cli.as_flag().is_none());
    }

    #[test]
    fn verbose_flag_parsed() {
        let cli = Cli::parse_from(["mm", "-v", "audit"]);
        assert!(cli.verbose);
    }

    #[test]
    fn completions_subcommand_parses() {
        let cli = Cli::parse_from(["mm", "completions", "zsh"]);
        assert!(matches!(
            cli.command,
            Commands::Completions(cmd::completions::CompletionsArgs {
                shell: clap_complete::Shell::Zsh,
            })
        ));
    }

    #[test]
    fn completions_mention_subcommands() {
        let mut buf = Vec::new();
        cmd::completions::write_completions(
            clap_complete::Shell::Bash,
            &mut Cli::command(),
            &mut buf,
        );
        let script = String::from_utf8(buf).expect("utf8");
        assert!(script.contains("react"));
        assert!(script.contains("audit"));
    }

    #[test]
    fn all_subcommands_listed() {
        let subcommands = [
            vec!["mm", "init"],
            vec!["mm", "init", "--force"],
            vec!["mm", "post", "hello"],
            vec!["mm", "list", "--sort", "hot", "-n", "3"],
            vec!["mm", "list", "--after", "1:mm-1"],
            vec!["mm", "react", "mm-1", "laugh"],
            vec!["mm", "delete", "mm-1", "--secret", "s"],
            vec!["mm", "audit", "--repair"],
            vec!["mm", "whoami"],
            vec!["mm", "completions", "bash"],
        ];
        for args in &subcommands {
            let result = Cli::try_parse_from(args.iter());
            assert!(
                result.is_ok(),
                "Failed to parse: {:?}: {:?}",
                args,
                result.err()
            );
        }
    }

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
