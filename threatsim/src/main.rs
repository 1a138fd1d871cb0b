// src/main.rs
//
// Evaluation / conversion CLI for the threat simulation environment.
//
// Config precedence:
//     explicit flags > --config YAML > THREATSIM_* env vars > defaults.
//
// Subcommands:
// - evaluate: roll a scripted policy through seeded episodes and print a
//   JSON summary (optionally streaming per-step JSONL telemetry).
// - convert: encode collector threat records into flat state vectors.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use threatsim::config::EnvConfig;
use threatsim::intel::IntelFeed;
use threatsim::rl::{
    encode_labelled_records, encode_records, evaluate_with_telemetry, AlwaysBlock, Analyzer,
    Blocker, Defender, EvaluationSummary, FeedOrder, MultiAgentEnv, NeverBlock,
    PacketSizeThreshold, PairedPolicy, Policy, RandomPolicy, RoleScores, ScriptedActions, SimEnv,
    StepTelemetry,
};

#[derive(Debug, Parser)]
#[command(
    name = "threatsim",
    about = "Threat simulation environment: policy evaluation and feed conversion",
    version
)]
struct Cli {
    /// Verbosity: -v, -vv (RUST_LOG takes precedence when set)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate a scripted policy over seeded episodes.
    Evaluate(EvaluateArgs),
    /// Encode threat records into state vectors.
    Convert(ConvertArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Single,
    Multi,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum RoleArg {
    Blocker,
    Analyzer,
    Defender,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    AlwaysBlock,
    NeverBlock,
    Random,
    PacketThreshold,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum FeedOrderArg {
    Fixed,
    Shuffled,
}

#[derive(Debug, Args)]
struct EvaluateArgs {
    #[arg(long, value_enum, default_value_t = ModeArg::Single)]
    mode: ModeArg,

    /// Role to evaluate in single mode.
    #[arg(long, value_enum, default_value_t = RoleArg::Blocker)]
    role: RoleArg,

    /// Policy (blocker policy in multi mode).
    #[arg(long, value_enum, default_value_t = PolicyArg::PacketThreshold)]
    policy: PolicyArg,

    /// Analyzer policy in multi mode (defaults to --policy).
    #[arg(long, value_enum)]
    analyzer_policy: Option<PolicyArg>,

    #[arg(long, default_value_t = 10)]
    episodes: usize,

    /// Episode i is seeded `seed + i`.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// YAML environment config.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Intel feed: a JSON file, or a directory holding threats_*.json files.
    #[arg(long)]
    feed: Option<PathBuf>,

    #[arg(long, value_enum)]
    feed_order: Option<FeedOrderArg>,

    #[arg(long)]
    max_steps: Option<u64>,

    #[arg(long)]
    threat_probability: Option<f64>,

    /// Packet size threshold (bytes) for the packet-threshold policy.
    #[arg(long, default_value_t = threatsim::rl::policy::DEFAULT_PACKET_THRESHOLD)]
    packet_threshold: f32,

    /// Append per-step JSONL telemetry here.
    #[arg(long)]
    telemetry: Option<PathBuf>,

    /// Write the JSON summary here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ConvertArgs {
    /// Threat records: a JSON file, or a directory holding threats_*.json files.
    #[arg(long)]
    input: PathBuf,

    /// Write vectors here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Seed for address and packet size sampling.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Append the ground-truth label (1 threat, 0 benign) as a fifth column.
    #[arg(long)]
    with_label: bool,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}


fn build_config(args: &EvaluateArgs) -> Result<EnvConfig> {
    let mut config = match &args.config {
        Some(path) => EnvConfig::load_yaml(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EnvConfig::from_env_or_default(),
    };
    if let Some(feed) = args.feed.as_ref().and_then(|path| IntelFeed::open_or_warn(path)) {
        config = config.with_intel_feed(feed);
    }
    if let Some(order) = args.feed_order {
        config = config.with_feed_order(match order {
            FeedOrderArg::Fixed => FeedOrder::Fixed,
            FeedOrderArg::Shuffled => FeedOrder::Shuffled,
        });
    }
    if let Some(max_steps) = args.max_steps {
        config = config.with_max_steps(max_steps);
    }
    if let Some(p) = args.threat_probability {
        config = config.with_threat_probability(p);
    }
    config.validate().context("invalid environment config")?;
    Ok(config)
}

fn scripted<R: ScriptedActions>(
    policy: PolicyArg,
    args: &EvaluateArgs,
) -> Box<dyn Policy<SimEnv<R>>> {
    match policy {
        PolicyArg::AlwaysBlock => Box::new(AlwaysBlock),
        PolicyArg::NeverBlock => Box::new(NeverBlock),
        PolicyArg::Random => Box::new(RandomPolicy::new(args.seed)),
        PolicyArg::PacketThreshold => Box::new(PacketSizeThreshold::new(args.packet_threshold)),
    }
}

fn run<E, P>(env: &mut E, policy: &mut P, args: &EvaluateArgs) -> Result<EvaluationSummary>
where
    E: RoleScores,
    P: Policy<E> + ?Sized,
{
    let summary = match &args.telemetry {
        Some(path) => {
            let mut sink = StepTelemetry::create(path)
                .with_context(|| format!("opening telemetry file {}", path.display()))?;
            let summary =
                evaluate_with_telemetry(env, policy, args.episodes, args.seed, Some(&mut sink))?;
            sink.flush().context("flushing telemetry")?;
            info!(path = %path.display(), records = sink.records(), "telemetry written");
            summary
        }
        None => evaluate_with_telemetry::<E, P, std::io::Sink>(
            env,
            policy,
            args.episodes,
            args.seed,
            None,
        )?,
    };
    Ok(summary)
}

fn evaluate_single<R: ScriptedActions>(
    config: EnvConfig,
    args: &EvaluateArgs,
) -> Result<EvaluationSummary> {
    let mut env = SimEnv::<R>::new(config)?;
    let mut policy = scripted::<R>(args.policy, args);
    run(&mut env, &mut *policy, args)
}

fn cmd_evaluate(args: &EvaluateArgs) -> Result<()> {
    if args.episodes == 0 {
        bail!("--episodes must be at least 1");
    }
    let config = build_config(args)?;
    let feed_digest = config
        .intel_feed
        .as_ref()
        .map(|f| f.digest())
        .unwrap_or_else(|| "none".to_string());
    info!(
        mode = ?args.mode,
        max_steps = config.max_steps,
        threat_probability = config.threat_probability,
        feed = %feed_digest,
        "starting evaluation"
    );

    let summary = match args.mode {
        ModeArg::Single => match args.role {
            RoleArg::Blocker => evaluate_single::<Blocker>(config, args)?,
            RoleArg::Analyzer => evaluate_single::<Analyzer>(config, args)?,
            RoleArg::Defender => evaluate_single::<Defender>(config, args)?,
        },
        ModeArg::Multi => {
            let mut env = MultiAgentEnv::new(config)?;
            let analyzer_policy = args.analyzer_policy.unwrap_or(args.policy);
            let mut policy = PairedPolicy::new(
                scripted::<Blocker>(args.policy, args),
                scripted::<Analyzer>(analyzer_policy, args),
            );
            run(&mut env, &mut policy, args)?
        }
    };

    let json = summary.to_json_pretty()?;
    match &args.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "summary written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn cmd_convert(args: &ConvertArgs) -> Result<()> {
    let feed = IntelFeed::open(&args.input)
        .with_context(|| format!("loading threat records from {}", args.input.display()))?;
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let json = if args.with_label {
        serde_json::to_string(&encode_labelled_records(feed.records(), &mut rng))?
    } else {
        serde_json::to_string(&encode_records(feed.records(), &mut rng))?
    };
    match &args.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), records = feed.len(), "state vectors written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Command::Evaluate(args) => cmd_evaluate(args),
        Command::Convert(args) => cmd_convert(args),
    }
}
