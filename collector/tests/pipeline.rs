//! End-to-end pipeline tests: input workers through processor chains
//! into outputs and the pull cache.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;

use virta_collector::inputs::{ChannelBuilder, Input, InputOptions, StreamInput};
use virta_collector::outputs::{Output, OutputOptions, Outputs, PullOutput};
use virta_collector::processors::ProcessorRegistry;
use virta_collector::{encode_event_batch, EventMsg, PluginConfig};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config(json: serde_json::Value) -> PluginConfig {
    let serde_json::Value::Object(map) = json else {
        unreachable!("test configs are objects");
    };
    map
}

fn sample_event(number: &str) -> EventMsg {
    let mut ev = EventMsg::with_timestamp("sub1", 100);
    // Distinct source per event so cache keys do not collide.
    ev.add_tag("source", format!("r{number}:57400"));
    ev.add_value("number", json!(number));
    ev.add_value("in-octets", json!(1500));
    ev
}

async fn wait_until<F: Fn() -> bool>(cond: F) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn stream_input_feeds_pull_output_through_chain() {
    init_tracing();
    // Pull output with no per-output processors.
    let mut pull = PullOutput::default();
    pull.init("scrape", &config(json!({})), OutputOptions::default())
        .await
        .unwrap();
    let pull = Arc::new(pull);

    let outputs = Outputs::new();
    outputs.add("scrape", pull.clone() as Arc<dyn Output>);

    // Input-side chain tags events carrying number == "42".
    let registry = Arc::new(ProcessorRegistry::with_defaults());
    let mut definitions = HashMap::new();
    definitions.insert(
        "flag-answer".to_string(),
        config(json!({
            "event-add-tag": {
                "condition": r#".values.number == "42""#,
                "add": {"sev": "high"},
            }
        })),
    );

    let (feed, builder) = ChannelBuilder::new(16);
    let mut input = StreamInput::new(builder);
    input
        .start(
            "chan1",
            &config(json!({
                "num-workers": 2,
                "event-processors": ["flag-answer"],
            })),
            InputOptions {
                outputs: outputs.select(&["scrape".to_string()]).unwrap(),
                processor_definitions: definitions,
                registry,
                name_prefix: "virta".to_string(),
            },
        )
        .await
        .unwrap();

    let batch = vec![sample_event("42"), sample_event("7")];
    feed.send(Bytes::from(encode_event_batch(&batch).unwrap()))
        .await
        .unwrap();

    wait_until(|| pull.collect().len() == 4).await;
    input.close().await.unwrap();

    let samples = pull.collect();
    // Both events expose the numeric in-octets value; "42" is numeric
    // too, "7" as well, so four samples total.
    assert_eq!(samples.len(), 4);
    let flagged: Vec<_> = samples
        .iter()
        .filter(|s| s.labels.get("sev") == Some(&"high".to_string()))
        .collect();
    assert_eq!(flagged.len(), 2);

    // Reads are non-destructive until entries expire.
    assert_eq!(pull.collect().len(), 4);
}

#[tokio::test]
async fn pull_output_serves_fresh_entries_only() {
    init_tracing();
    let mut pull = PullOutput::default();
    pull.init(
        "scrape",
        &config(json!({"cache": {"ttl": "40ms"}})),
        OutputOptions::default(),
    )
    .await
    .unwrap();

    pull.write_event(&sample_event("1")).await.unwrap();
    assert!(!pull.collect().is_empty());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(pull.collect().is_empty());

    // A fresh write brings the key back.
    pull.write_event(&sample_event("2")).await.unwrap();
    assert!(!pull.collect().is_empty());
}

#[tokio::test]
async fn input_delivers_only_to_selected_outputs() {
    init_tracing();
    let mut chosen = PullOutput::default();
    chosen
        .init("chosen", &config(json!({})), OutputOptions::default())
        .await
        .unwrap();
    let chosen = Arc::new(chosen);

    let mut ignored = PullOutput::default();
    ignored
        .init("ignored", &config(json!({})), OutputOptions::default())
        .await
        .unwrap();
    let ignored = Arc::new(ignored);

    let outputs = Outputs::new();
    outputs.add("chosen", chosen.clone() as Arc<dyn Output>);
    outputs.add("ignored", ignored.clone() as Arc<dyn Output>);

    let (feed, builder) = ChannelBuilder::new(4);
    let mut input = StreamInput::new(builder);
    input
        .start(
            "chan1",
            &config(json!({})),
            InputOptions {
                outputs: outputs.select(&["chosen".to_string()]).unwrap(),
                ..InputOptions::default()
            },
        )
        .await
        .unwrap();

    feed.send(Bytes::from(
        encode_event_batch(&[sample_event("1")]).unwrap(),
    ))
    .await
    .unwrap();

    wait_until(|| !chosen.collect().is_empty()).await;
    input.close().await.unwrap();

    assert!(ignored.collect().is_empty());
}

#[tokio::test]
async fn delivered_events_survive_input_close() {
    init_tracing();
    let mut pull = PullOutput::default();
    pull.init("scrape", &config(json!({})), OutputOptions::default())
        .await
        .unwrap();
    let pull = Arc::new(pull);

    let outputs = Outputs::new();
    outputs.add("scrape", pull.clone() as Arc<dyn Output>);

    let (feed, builder) = ChannelBuilder::new(64);
    let mut input = StreamInput::new(builder);
    input
        .start(
            "chan1",
            &config(json!({})),
            InputOptions {
                outputs: outputs.select(&[]).unwrap(),
                ..InputOptions::default()
            },
        )
        .await
        .unwrap();

    for i in 0..20 {
        let mut ev = EventMsg::with_timestamp("sub1", i);
        ev.add_tag("source", format!("r{i}"));
        ev.add_value("x", json!(i));
        feed.send(Bytes::from(encode_event_batch(&[ev]).unwrap()))
            .await
            .unwrap();
    }
    wait_until(|| pull.collect().len() == 20).await;
    input.close().await.unwrap();

    // Everything delivered stays readable after the input is gone.
    let samples = pull.collect();
    assert_eq!(samples.len(), 20);
}
