use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use voice_relay::audio::{DeviceConfig, InputDeviceFactory, InputSource};
use voice_relay::protocol::ResponseData;
use voice_relay::{
    AudioCaptureEngine, Config, DispatchTable, PlaybackHelper, PushToTalk, RealtimeClient,
    ReconnectPolicy, StateError,
};

#[derive(Parser)]
#[command(name = "voice-relay")]
#[command(about = "Push-to-talk client for a realtime voice assistant", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(long, short, default_value = "config/voice-relay")]
    config: String,

    /// Assistant base URL, overrides server.base_url
    #[arg(long)]
    base_url: Option<String>,

    /// Client identifier, overrides server.client_id
    #[arg(long)]
    client_id: Option<String>,

    /// How long to hold the talk button before stopping
    #[arg(long, default_value = "3000")]
    record_ms: u64,

    /// Record from a WAV file instead of the microphone
    #[arg(long)]
    input: Option<String>,

    /// Send a typed message instead of recording
    #[arg(long)]
    text: Option<String>,

    /// Do not play reply audio
    #[arg(long)]
    no_playback: bool,

    /// Seconds to wait for the assistant's reply
    #[arg(long, default_value = "30")]
    reply_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut cfg = Config::load_or_default(&cli.config)?;
    if let Some(base_url) = cli.base_url {
        cfg.server.base_url = base_url;
    }
    if let Some(client_id) = cli.client_id {
        cfg.server.client_id = client_id;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Endpoint: {}", cfg.endpoint());

    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ResponseData>();
    let dispatch = DispatchTable::new()
        .on_transcription(|t| info!("You said: {}", t.text))
        .on_status(|s| info!("Status: {} {}", s.status, s.message))
        .on_error(|e| error!("Assistant error: {}", e.error))
        .on_reminders(|r| info!("{} reminders", r.reminders.len()))
        .on_response(move |r| {
            let _ = reply_tx.send(r);
        })
        .on_connect(|| info!("Connected"))
        .on_disconnect(|| warn!("Connection lost"));

    let client = Arc::new(RealtimeClient::new(
        &cfg.server.base_url,
        &cfg.server.client_id,
        ReconnectPolicy::from(&cfg.reconnect),
    ));
    client
        .connect(dispatch)
        .await
        .context("Failed to connect to assistant")?;

    let source = match cli.input {
        Some(path) => InputSource::File(path),
        None => InputSource::Microphone,
    };
    let device = InputDeviceFactory::create(source, DeviceConfig::from(&cfg.capture));
    let engine = AudioCaptureEngine::new(cfg.capture.clone(), device);
    let mut ptt = PushToTalk::new(
        engine,
        client.clone(),
        Duration::from_millis(cfg.capture.max_duration_ms),
    );

    if let Some(text) = cli.text {
        if !ptt.send_text(&text) {
            warn!("Message was not sent");
        }
    } else {
        ptt.start_listening().await?;
        info!("Recording for up to {}ms", cli.record_ms);

        let from_ceiling = tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(cli.record_ms)) => None,
            payload = ptt.next_ceiling_payload() => payload,
        };

        match from_ceiling {
            Some(payload) => info!("Recording ceiling reached after {}ms", payload.duration_ms),
            None => match ptt.stop_listening().await {
                Ok(_) => {}
                // The ceiling may finalize between the timer and the stop
                Err(e) if e.as_state() == Some(StateError::NotRecording) => {
                    ptt.next_ceiling_payload().await;
                }
                Err(e) => return Err(e.into()),
            },
        }
    }

    match tokio::time::timeout(Duration::from_secs(cli.reply_timeout), reply_rx.recv()).await {
        Ok(Some(reply)) => {
            info!("Assistant: {}", reply.text);
            match reply.audio {
                Some(audio) if !cli.no_playback => {
                    let mut playback = PlaybackHelper::new();
                    if let Err(e) = playback.play(&audio).await {
                        warn!("Could not play reply: {}", e);
                    }
                }
                _ => {}
            }
        }
        Ok(None) => warn!("Connection closed before a reply arrived"),
        Err(_) => warn!("No reply within {}s", cli.reply_timeout),
    }

    ptt.shutdown();

    let stats = ptt.stats();
    info!("Session stats: {}", serde_json::to_string(&stats)?);

    Ok(())
}
