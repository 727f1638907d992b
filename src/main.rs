use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use anyhow::Result;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use reqwest::blocking::Client;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use coldbench::cloud::{CloudLoggingApi, CloudRunApi};
use coldbench::config::{self, Overrides, Settings};
use coldbench::credential::{Anonymous, CommandCredential, CredentialSource};
use coldbench::display;
use coldbench::experiment::{self, Report};
use coldbench::job::{self, JobRunner};
use coldbench::probe::{self, HttpProber};

#[derive(Parser)]
#[command(
    name = "coldbench",
    version,
    about = "Compare cold-start and total-execution latency of a service and a batch job"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: <config dir>/coldbench/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the report as JSON; progress goes to stderr
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Args)]
struct Target {
    /// Service URL to probe
    #[arg(long)]
    url: Option<String>,

    /// Project that owns the job
    #[arg(long)]
    project: Option<String>,

    #[arg(long)]
    region: Option<String>,

    /// Job name
    #[arg(long)]
    job: Option<String>,

    /// Send requests without credentials
    #[arg(long)]
    no_auth: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Probe the service once and measure one job execution's cold start
    ColdStart(Target),

    /// Probe the service repeatedly and summarize the latencies
    Many {
        #[command(flatten)]
        target: Target,

        #[arg(short, long)]
        runs: Option<usize>,
    },

    /// Probe the service once and measure one job execution end to end
    TotalTime(Target),

    /// Run every experiment in sequence
    All {
        #[command(flatten)]
        target: Target,

        #[arg(short, long)]
        runs: Option<usize>,
    },

    /// Print the job startup marker; run this first inside the job container
    Marker {
        /// Execution id (default: $CLOUD_RUN_EXECUTION)
        #[arg(long)]
        execution_id: Option<String>,
    },
}

fn overrides(target: &Target, runs: Option<usize>) -> Overrides {
    Overrides {
        service_url: target.url.clone(),
        project: target.project.clone(),
        region: target.region.clone(),
        job_name: target.job.clone(),
        runs,
        anonymous: target.no_auth,
    }
}

fn credential(settings: &Settings, argv: &[String]) -> Box<dyn CredentialSource> {
    if settings.anonymous {
        Box::new(Anonymous)
    } else {
        Box::new(CommandCredential::new(argv, settings.credential_max_age))
    }
}

fn build_prober(settings: &Settings, client: &Client) -> HttpProber {
    HttpProber::new(
        client.clone(),
        credential(settings, &settings.identity_command),
        settings.request_timeout,
    )
}

fn build_job_runner(settings: &Settings, client: &Client) -> JobRunner {
    let control = CloudRunApi::new(
        client.clone(),
        &settings.run_api_endpoint,
        credential(settings, &settings.access_command),
        settings.request_timeout,
    );
    let logs = CloudLoggingApi::new(
        client.clone(),
        &settings.logging_api_endpoint,
        credential(settings, &settings.access_command),
        settings.request_timeout,
    );
    JobRunner::new(Box::new(control), Box::new(logs), settings.job)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Plan {
    ColdStart,
    Many,
    TotalTime,
    All,
}

fn measure(cli: &Cli, plan: Plan, overrides: &Overrides) -> Result<()> {
    let mut settings = Settings::from_file(config::load_config(cli.config.as_deref())?);
    settings.apply(overrides);

    // Resolve everything the plan needs before any measurement starts.
    let service_url = settings.service_url()?.to_string();
    let job = match plan {
        Plan::Many => None,
        _ => Some(settings.job_ref()?),
    };
    debug!(%service_url, ?job, runs = settings.runs, "resolved settings");

    let client = probe::http_client()?;
    let prober = build_prober(&settings, &client);
    let runner = build_job_runner(&settings, &client);

    let stdout = io::stdout();
    let stderr = io::stderr();
    let mut progress: Box<dyn Write> = if cli.json {
        Box::new(stderr.lock())
    } else {
        Box::new(stdout.lock())
    };

    let mut report = Report::new(Utc::now());
    let _ = writeln!(progress, "--- Starting {} ---", plan_title(plan));

    if let (Plan::ColdStart | Plan::All, Some(job)) = (plan, &job) {
        report.scenarios.push(experiment::cold_start_comparison(
            &prober,
            &runner,
            &service_url,
            job,
            &mut progress,
        ));
    }
    if matches!(plan, Plan::Many | Plan::All) {
        if plan == Plan::All {
            let _ = writeln!(progress);
        }
        report.scenarios.push(experiment::repeated_calls(
            &prober,
            &service_url,
            settings.runs,
            &mut progress,
        ));
    }
    if let (Plan::TotalTime | Plan::All, Some(job)) = (plan, &job) {
        if plan == Plan::All {
            let _ = writeln!(progress);
        }
        report.scenarios.push(experiment::total_lifecycle_comparison(
            &prober,
            &runner,
            &service_url,
            job,
            &mut progress,
        ));
    }

    let _ = writeln!(progress, "\n--- Test Complete ---");
    drop(progress);

    let output = if cli.json {
        display::format_json(&report) + "\n"
    } else {
        display::format_human(&report)
    };
    print!("{}", output);

    Ok(())
}

fn plan_title(plan: Plan) -> &'static str {
    match plan {
        Plan::ColdStart => "Cold Start Test",
        Plan::Many => "Repeated Call Test",
        Plan::TotalTime => "Total Execution Time Test",
        Plan::All => "All Tests",
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Command::ColdStart(target) => measure(&cli, Plan::ColdStart, &overrides(target, None)),
        Command::Many { target, runs } => measure(&cli, Plan::Many, &overrides(target, *runs)),
        Command::TotalTime(target) => measure(&cli, Plan::TotalTime, &overrides(target, None)),
        Command::All { target, runs } => measure(&cli, Plan::All, &overrides(target, *runs)),
        Command::Marker { execution_id } => {
            let id = execution_id
                .clone()
                .or_else(|| std::env::var("CLOUD_RUN_EXECUTION").ok())
                .unwrap_or_else(|| "unknown".to_string());
            job::emit_startup_marker(&id, &mut io::stdout())?;
            Ok(())
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("{}", err);
        process::exit(1);
    }
}
