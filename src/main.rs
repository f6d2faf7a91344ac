use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use tracing_subscriber::EnvFilter;

use grouch::Config;
use grouch::channels::DiscordBot;
use grouch::config::file::config_file_path;
use grouch::dialogue::{OpenAiDialogue, Responder};
use grouch::voice::{GladiaSynthesizer, GladiaTranscriber, Synthesizer, Transcriber, probe_audio};

/// grouch - Discord voice bot that answers its wake word, grudgingly
#[derive(Parser)]
#[command(name = "grouch", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bot (default)
    Run,
    /// Transcribe an audio file
    TestStt {
        /// Raw PCM or WAV file
        file: PathBuf,
    },
    /// Ask the persona a question
    Ask {
        /// Request text
        text: String,
    },
    /// Synthesize text to an audio file
    TestTts {
        /// Text to speak
        #[arg(default_value = "Ну что ещё? Я занят.")]
        text: String,
        /// Output file
        #[arg(short, long, default_value = "grouch-tts.mp3")]
        out: PathBuf,
    },
    /// Print the resolved configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,grouch=info",
        1 => "info,grouch=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_bot(&config).await,
        Command::TestStt { file } => test_stt(&config, &file).await,
        Command::Ask { text } => ask(&config, &text).await,
        Command::TestTts { text, out } => test_tts(&config, &text, &out).await,
        Command::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn run_bot(config: &Config) -> anyhow::Result<()> {
    config.warn_missing_keys();

    tracing::info!(
        wake_word = %config.persona.wake_word,
        silence_ms = config.voice.silence.as_millis(),
        min_segment_bytes = config.voice.min_segment_bytes,
        "starting grouch"
    );

    let bot = DiscordBot::new(config)?;
    tracing::info!("grouch ready - say \"{}, ...\"", config.persona.wake_word);

    bot.run().await?;
    Ok(())
}

/// Transcribe a file through the STT client
async fn test_stt(config: &Config, file: &Path) -> anyhow::Result<()> {
    config.warn_missing_keys();

    let audio = tokio::fs::read(file).await?;
    println!("Transcribing {} bytes from {}...", audio.len(), file.display());

    let transcript = GladiaTranscriber::from_config(config).transcribe(&audio).await?;
    if transcript.is_empty() {
        println!("(empty transcript)");
    } else {
        println!("{transcript}");
    }

    Ok(())
}

/// Send one request through the dialogue client
async fn ask(config: &Config, text: &str) -> anyhow::Result<()> {
    config.warn_missing_keys();

    let reply = OpenAiDialogue::from_config(config).reply(text).await?;
    if reply.is_empty() {
        println!("(empty reply)");
    } else {
        println!("{reply}");
    }

    Ok(())
}

/// Synthesize text and write the audio to `out`
async fn test_tts(config: &Config, text: &str, out: &Path) -> anyhow::Result<()> {
    config.warn_missing_keys();
    println!("Synthesizing: \"{text}\"");

    let audio = GladiaSynthesizer::from_config(config).synthesize(text).await?;
    if audio.is_empty() {
        anyhow::bail!("service returned no audio");
    }

    tokio::fs::write(out, &audio).await?;
    println!("Wrote {} bytes to {}", audio.len(), out.display());

    match probe_audio(&audio) {
        Ok(info) => println!(
            "Format: {} Hz, {} channel(s), {:.2}s",
            info.sample_rate.unwrap_or_default(),
            info.channels.unwrap_or_default(),
            info.duration.unwrap_or_default().as_secs_f32()
        ),
        Err(e) => println!("Could not probe audio: {e}"),
    }

    Ok(())
}

fn show_config(config: &Config) {
    let redact = |secret: Option<&secrecy::SecretString>| {
        secret.map_or("(unset)", |s| {
            if s.expose_secret().is_empty() {
                "(unset)"
            } else {
                "(set)"
            }
        })
    };

    println!(
        "config file:       {}",
        config_file_path()
            .map_or_else(|| "(none)".to_string(), |p| p.display().to_string())
    );
    println!("discord token:     {}", redact(config.discord_token.as_ref()));
    println!("gladia key:        {}", redact(config.api_keys.gladia.as_ref()));
    println!("openai key:        {}", redact(config.api_keys.openai.as_ref()));
    println!("wake word:         {}", config.persona.wake_word);
    println!("style prompt:      {}", config.persona.style_prompt);
    println!("gladia url:        {}", config.endpoints.gladia_url);
    println!("openai url:        {}", config.endpoints.openai_url);
    println!(
        "llm:               {} (temperature {}, max_tokens {})",
        config.llm.model, config.llm.temperature, config.llm.max_tokens
    );
    println!("silence:           {} ms", config.voice.silence.as_millis());
    println!("min segment:       {} bytes", config.voice.min_segment_bytes);
    println!("join timeout:      {} s", config.voice.join_timeout.as_secs());
    println!("session idle:      {} s", config.voice.session_idle.as_secs());
    println!(
        "tts:               {} / {}",
        config.voice.tts_language, config.voice.tts_speaker
    );
    println!("stt wav container: {}", config.voice.stt_wav_container);
}
