//! Author a small funnel, publish it and walk through it as a visitor.
//!
//! Runs against a scripted oracle unless `GEMINI_API_KEY` is set.
//!
//! ```sh
//! RUST_LOG=chatflow=debug cargo run --example console
//! ```

use std::{collections::BTreeMap, sync::Arc};

use chatflow::{AnswerValue, Config, EdgeModel, EngineBuilder, Identity, NodeModel, oracle::ScriptedOracle};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn scripted() -> ScriptedOracle {
    ScriptedOracle::new()
        .with_json(json!({ "concise_text": "Hi! I help teams pick a plan. What are you building?", "buttons": [{ "label": "Get a quote", "next_message": "I'd like a quote" }] }))
        .with_json(json!({ "completed": true, "nextNodeKey": "contact", "reason": "visitor asked for a quote" }))
        .with_json(json!({ "summary": "Ada from Acme wants a quote for the team plan." }))
}

#[tokio::main]
async fn main() -> chatflow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let builder = EngineBuilder::new().config(Config::default());
    let engine = match std::env::var("GEMINI_API_KEY") {
        Ok(_) => builder.build()?,
        Err(_) => builder.oracle(Arc::new(scripted())).build()?,
    };

    let author = Identity::new("demo-author");
    let who = Some(&author);
    let studio = engine.studio();
    studio.upsert_variable(who, "demo", "company", "Acme")?;

    let workspace = studio.workspace(who, "demo", None)?;
    let version_id = workspace.version.id;
    let nodes = [
        NodeModel::agent("sales", "Sales guide", "You are a friendly sales guide for @company."),
        NodeModel::form(
            "contact",
            json!({ "title": "Contact", "questions": [
                { "id": "name", "text": "Your name?", "type": "text" },
                { "id": "plan", "text": "Which plan?", "type": "single_select", "options": [
                    { "id": "o1", "label": "Team", "value": "team" },
                    { "id": "o2", "label": "Enterprise", "value": "enterprise" }
                ] }
            ] }),
        ),
        NodeModel::report("report", json!({ "title": "Your summary", "systemPromptTemplate": "Summarize the lead for @company sales." })),
    ];
    let edges = [EdgeModel::new("to-contact", "sales", "contact", "visitor asks for a quote or pricing"), EdgeModel::new("to-report", "contact", "report", "")];
    studio.sync_workflow(who, &version_id, &nodes, &edges)?;
    studio.publish_version(who, "demo", &version_id)?;
    let token = engine.gateway().get_or_create_link(&version_id, false)?;
    println!("share token: {}", token);

    let (sid, opening) = engine.start_session(&token).await?;
    for message in &opening.messages {
        println!("agent: {}", message.text());
    }

    let outcome = engine.send_message(&sid, "I'd like a quote").await?;
    println!("now at: {:?}", outcome.state);

    let answers = BTreeMap::from([("name".to_string(), AnswerValue::from("Ada")), ("plan".to_string(), AnswerValue::from("team"))]);
    engine.submit_form(&sid, answers).await?;

    let outcome = engine.submit_report(&sid, "ada@acme.test").await?;
    println!("report: {}", outcome.report.unwrap_or_default());

    let analytics = engine.journeys().analytics(&version_id)?;
    println!("visits: {}, leads: {}, completion: {}%", analytics.total_visits, analytics.total_leads, analytics.completion_rate);
    println!("{}", engine.journeys().export_csv(&version_id)?);
    Ok(())
}
