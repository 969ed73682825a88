use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use volume_reorient::pipeline::{self, Report, RestoreTarget, Workflow};

mod cli;

use cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let (workflow, output) = match &cli.command {
        Commands::ToCanonical {
            input,
            output,
            target,
        } => (
            Workflow::ToCanonical {
                input,
                target: *target,
            },
            output,
        ),
        Commands::Restore {
            las_seg,
            orig_img,
            output,
        } => (
            Workflow::Restore {
                las_input: las_seg,
                reference: orig_img,
                target: RestoreTarget::ReferenceNative,
            },
            output,
        ),
        Commands::RestoreAssumingCanonical {
            las_seg,
            orig_img,
            output,
        } => (
            Workflow::Restore {
                las_input: las_seg,
                reference: orig_img,
                target: RestoreTarget::AssumeCanonical,
            },
            output,
        ),
    };

    let result = pipeline::run(workflow, output);

    match result {
        Ok(report) => {
            print_report(&report, cli.json);
            ExitCode::SUCCESS
        }
        Err(err) => {
            let kind = err.kind();
            eprintln!("error ({kind}): {err}");
            ExitCode::from(kind.exit_code())
        }
    }
}

fn print_report(report: &Report, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(text) => println!("{text}"),
            Err(err) => eprintln!("error: failed to encode report: {err}"),
        }
    } else {
        println!("{report}");
    }
}
