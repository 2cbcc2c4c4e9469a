use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use speech_orchestrator::{
    engines::espeak::EspeakEngine, SpeechConfig, SpeechOrchestrator, SpeechRequestBuilder,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => SpeechConfig::load(Path::new(&path))?,
        None => SpeechConfig::default(),
    };

    let engine = Arc::new(EspeakEngine::new().await);
    let orchestrator = SpeechOrchestrator::new(engine, config);

    let report = orchestrator.inspector().diagnose("ar-MA").await;
    println!("{}", report.summary());

    let start = Instant::now();
    match orchestrator.speak_moroccan_arabic("مرحبا بكم في المغرب").await {
        Ok(outcome) => println!(
            "Spoken via {:?} with {:?} after {} attempt(s) in {:.2?}",
            outcome.route,
            outcome.voice.map(|v| v.name),
            outcome.attempts,
            start.elapsed()
        ),
        Err(e) => println!("Arabic speech failed: {}", e.user_message()),
    }

    let outcome = orchestrator
        .speak_preset("Bienvenue au Maroc", "fr")
        .await?;
    println!("French: {:?}, states {:?}", outcome.route, outcome.states);

    let request = SpeechRequestBuilder::default()
        .language_tag("ja-JP")
        .rate(0.9f32)
        .build()?;
    if let Err(e) = orchestrator.speak("モロッコへようこそ", &request).await {
        println!("Japanese speech failed: {e}");
    }

    Ok(())
}
