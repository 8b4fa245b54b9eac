use clap::{Args as ClapArgs, Parser, Subcommand};
use crossbeam::channel::unbounded;
use std::sync::Arc;

use synsync_engine::config::EngineConfig;
use synsync_engine::renderer::render_offline;
use synsync_engine::timeline::CompiledTimeline;
use synsync_engine::{Engine, EngineObserver, OutputMode, ProtocolData, Tick};

/// CLI for streaming or rendering a session protocol
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream or render a protocol JSON file
    Run(RunArgs),
    /// Generate a default config file and exit
    GenerateConfig(ConfigArgs),
}

#[derive(ClapArgs)]
struct RunArgs {
    /// Path to the protocol JSON file
    #[arg(long)]
    path: String,
    /// Render the full session to a WAV file instead of streaming
    #[arg(long, default_value_t = false)]
    generate: bool,
    /// Output path for the rendered WAV
    #[arg(long, default_value = "session.wav")]
    out: String,
    /// Sample rate for offline rendering
    #[arg(long, default_value_t = 44_100)]
    sample_rate: u32,
    /// Output device profile
    #[arg(long, value_enum, default_value = "headphones")]
    mode: OutputMode,
}

#[derive(ClapArgs)]
struct ConfigArgs {
    /// Output path for the generated configuration
    #[arg(long, default_value = "config.toml")]
    out: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_command(args)?,
        Commands::GenerateConfig(cfg) => {
            EngineConfig::generate_default(&cfg.out)?;
            println!("Generated default config at {}", cfg.out);
        }
    }
    Ok(())
}

fn load_protocol(path: &str) -> Result<ProtocolData, Box<dyn std::error::Error>> {
    let json_str = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json_str)?)
}

fn run_command(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let protocol = load_protocol(&args.path)?;

    if args.generate {
        render_full_wav(&protocol, &args.out, args.sample_rate)?;
        println!("Rendered session to {}", args.out);
        return Ok(());
    }

    let engine = Engine::new();
    engine.load_protocol(&protocol)?;
    engine.set_output_mode(args.mode);
    engine.unlock()?;

    struct Progress;
    impl EngineObserver for Progress {
        fn on_tick(&self, tick: Tick) {
            print!(
                "\rphase {} | {:7.1}s elapsed",
                tick.phase_index + 1,
                tick.total_elapsed
            );
            use std::io::Write;
            let _ = std::io::stdout().flush();
        }
    }
    struct Done(crossbeam::channel::Sender<()>);
    impl EngineObserver for Done {
        fn on_complete(&self) {
            let _ = self.0.send(());
        }
        fn on_fault(&self) {
            eprintln!("\naudio output lost; stopping");
            let _ = self.0.send(());
        }
    }

    let (tx, rx) = unbounded();
    engine.subscribe(Box::new(Progress));
    engine.subscribe(Box::new(Done(tx.clone())));
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    engine.play()?;
    println!("Playing {}... press Ctrl+C to stop", args.path);
    let _ = rx.recv();
    engine.stop();
    println!();
    Ok(())
}

fn render_full_wav(
    protocol: &ProtocolData,
    out_path: &str,
    sample_rate: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    use hound::{SampleFormat, WavSpec, WavWriter};

    let timeline = Arc::new(CompiledTimeline::compile(protocol)?);
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(out_path, spec)?;
    let start_time = std::time::Instant::now();

    let mut write_err = None;
    render_offline(
        timeline,
        sample_rate as f32,
        &EngineConfig::default(),
        |l, r| {
            for sample in [l, r] {
                let s = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                if let Err(e) = writer.write_sample(s) {
                    write_err.get_or_insert(e);
                }
            }
        },
    );
    if let Some(e) = write_err {
        return Err(e.into());
    }

    writer.finalize()?;
    println!(
        "Total generation time: {:.2}s",
        start_time.elapsed().as_secs_f32()
    );
    Ok(())
}
