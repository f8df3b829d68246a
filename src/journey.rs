//! Journey persistence: append-only journey rows, lead listing, analytics and CSV export.

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::{
    Result,
    model::{JourneySummary, NodeCategory},
    store::{Store, data::JourneyRow, query::Query},
    utils::{self, time},
};

const CSV_HEADER: [&str; 5] = ["ID", "Email", "Created At", "AI Report", "Variables"];

/// Where a finished session hands its journey.
pub trait JourneySink: Send + Sync {
    /// Persist one journey, returning the new journey id.
    fn save(
        &self,
        version_id: &str,
        email: &str,
        summary: JourneySummary,
    ) -> Result<String>;
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub total_visits: i64,
    pub total_leads: usize,
    /// leads per visit in percent, one decimal
    pub completion_rate: f64,
}

#[derive(Clone)]
pub struct JourneyGateway {
    store: Arc<Store>,
}

impl JourneyGateway {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
        }
    }

    /// Insert a new journey row. Resubmissions create further rows.
    pub fn save_journey(
        &self,
        version_id: &str,
        email: &str,
        summary: &JourneySummary,
    ) -> Result<JourneyRow> {
        let row = JourneyRow {
            id: utils::longid(),
            version_id: version_id.to_string(),
            email: email.to_string(),
            summary: serde_json::to_string(summary)?,
            created_at: time::time_millis(),
        };
        self.store.journeys().create(&row)?;
        info!(version = version_id, journey = %row.id, "journey saved");
        Ok(row)
    }

    /// Journeys of a version, newest first.
    pub fn list_leads(
        &self,
        version_id: &str,
    ) -> Result<Vec<JourneyRow>> {
        Ok(self.store.journeys().query(&Query::new().filter("version_id", version_id).order_by("created_at", true))?.rows)
    }

    pub fn analytics(
        &self,
        version_id: &str,
    ) -> Result<Analytics> {
        let version = self.store.versions().find(version_id)?;
        let total_leads = self.store.journeys().query(&Query::new().filter("version_id", version_id).set_limit(1))?.count;
        Ok(Analytics {
            total_visits: version.visit_count,
            total_leads,
            completion_rate: completion_rate(total_leads, version.visit_count),
        })
    }

    /// Question id to question text over every form node of a version.
    pub fn question_mapping(
        &self,
        version_id: &str,
    ) -> Result<HashMap<String, String>> {
        let mut mapping = HashMap::new();
        for row in self.store.version_nodes(version_id)? {
            let node = row.model()?;
            if node.category() != NodeCategory::Form {
                continue;
            }
            let questions = node.form_config.as_ref().and_then(|c| c.get("questions")).and_then(Value::as_array);
            for question in questions.into_iter().flatten() {
                let id = question.get("id").and_then(Value::as_str).unwrap_or_default();
                let text = question.get("text").and_then(Value::as_str).unwrap_or_default();
                if !id.is_empty() && !text.is_empty() {
                    mapping.insert(id.to_string(), text.to_string());
                }
            }
        }
        Ok(mapping)
    }

    /// Render the leads of a version as CSV, newest first.
    pub fn export_csv(
        &self,
        version_id: &str,
    ) -> Result<String> {
        let mapping = self.question_mapping(version_id)?;
        let mut lines = vec![csv_row(CSV_HEADER)];

        for row in self.list_leads(version_id)? {
            let summary = row.summary().unwrap_or_else(|e| {
                warn!(journey = %row.id, error = %e, "unreadable journey summary, exported empty");
                JourneySummary::default()
            });

            let variables: Map<String, Value> = summary
                .variables
                .iter()
                .map(|(id, var)| {
                    let label = var.question_text().or_else(|| mapping.get(id).map(String::as_str)).unwrap_or(id);
                    (label.to_string(), var.value())
                })
                .collect();

            let created_at = time::rfc3339_millis(row.created_at);
            let report = summary.ai_report.unwrap_or_default();
            let variables = Value::Object(variables).to_string();
            lines.push(csv_row([row.id.as_str(), row.email.as_str(), created_at.as_str(), report.as_str(), variables.as_str()]));
        }

        Ok(lines.join("\n"))
    }
}

impl JourneySink for JourneyGateway {
    fn save(
        &self,
        version_id: &str,
        email: &str,
        summary: JourneySummary,
    ) -> Result<String> {
        Ok(self.save_journey(version_id, email, &summary)?.id)
    }
}

fn completion_rate(
    leads: usize,
    visits: i64,
) -> f64 {
    if visits <= 0 {
        return 0.0;
    }
    let rate = leads as f64 / visits as f64 * 100.0;
    (rate * 10.0).round() / 10.0
}

/// Quote a CSV field when it holds a comma, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_row<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    fields.into_iter().map(csv_field).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::{
        model::{ChatMessage, NodeModel, RuntimeVariable, RuntimeVariables},
        store::{
            DbStore, MemStore,
            data::{NodeRow, VersionRow, VersionStatus},
        },
    };

    fn gateway() -> (JourneyGateway, Arc<Store>) {
        let store = Arc::new(Store::new());
        MemStore::new().init(&store).unwrap();
        store
            .versions()
            .create(&VersionRow {
                id: "v1".into(),
                graph_id: "g1".into(),
                version_number: 1,
                status: VersionStatus::Published,
                public_token: None,
                visit_count: 0,
                created_at: 0,
            })
            .unwrap();
        (JourneyGateway::new(store.clone()), store)
    }

    fn journey(
        id: &str,
        email: &str,
        created_at: i64,
        summary: Value,
    ) -> JourneyRow {
        JourneyRow {
            id: id.into(),
            version_id: "v1".into(),
            email: email.into(),
            summary: summary.to_string(),
            created_at,
        }
    }

    /// Minimal RFC 4180 splitter for a single line.
    fn split_csv(line: &str) -> Vec<String> {
        let mut fields = vec![String::new()];
        let mut quoted = false;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '"' if quoted && chars.peek() == Some(&'"') => {
                    chars.next();
                    fields.last_mut().unwrap().push('"');
                }
                '"' => quoted = !quoted,
                ',' if !quoted => fields.push(String::new()),
                c => fields.last_mut().unwrap().push(c),
            }
        }
        fields
    }

    #[test]
    fn test_completion_rate() {
        assert_eq!(completion_rate(0, 0), 0.0);
        assert_eq!(completion_rate(1, 3), 33.3);
        assert_eq!(completion_rate(2, 3), 66.7);
        assert_eq!(completion_rate(5, 5), 100.0);
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_save_is_append_only() {
        let (gateway, _) = gateway();
        let mut vars = RuntimeVariables::new();
        vars.insert(
            "q1".into(),
            RuntimeVariable {
                value: "Ada".into(),
                question_text: "Name?".into(),
            },
        );
        let summary = JourneySummary::new(&[ChatMessage::user("hi")], &vars, "report");

        let first = gateway.save("v1", "ada@example.com", summary.clone()).unwrap();
        let second = gateway.save("v1", "ada@example.com", summary).unwrap();
        assert_ne!(first, second);

        let leads = gateway.list_leads("v1").unwrap();
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].summary().unwrap().variables["q1"].question_text(), Some("Name?"));
    }

    #[test]
    fn test_list_leads_newest_first() {
        let (gateway, store) = gateway();
        store.journeys().create(&journey("j1", "old@x.com", 100, json!({}))).unwrap();
        store.journeys().create(&journey("j2", "new@x.com", 200, json!({}))).unwrap();

        let emails: Vec<String> = gateway.list_leads("v1").unwrap().into_iter().map(|j| j.email).collect();
        assert_eq!(emails, vec!["new@x.com".to_string(), "old@x.com".to_string()]);
    }

    #[test]
    fn test_analytics() {
        let (gateway, store) = gateway();
        assert_eq!(
            gateway.analytics("v1").unwrap(),
            Analytics {
                total_visits: 0,
                total_leads: 0,
                completion_rate: 0.0
            }
        );

        let mut version = store.versions().find("v1").unwrap();
        version.visit_count = 3;
        store.versions().update(&version).unwrap();
        store.journeys().create(&journey("j1", "a@x.com", 1, json!({}))).unwrap();

        let analytics = gateway.analytics("v1").unwrap();
        assert_eq!(analytics.total_leads, 1);
        assert_eq!(analytics.completion_rate, 33.3);
        assert!(gateway.analytics("missing").is_err());
    }

    #[test]
    fn test_question_mapping() {
        let (gateway, store) = gateway();
        let form = NodeModel::form(
            "F",
            json!({ "title": "Contact", "questions": [{ "id": "q1", "text": "Name?", "type": "text" }, { "id": "q2", "text": "", "type": "text" }] }),
        );
        store.nodes().create(&NodeRow::new("v1", &form, 0).unwrap()).unwrap();
        store.nodes().create(&NodeRow::new("v1", &NodeModel::agent("A", "Guide", "hi"), 1).unwrap()).unwrap();

        let mapping = gateway.question_mapping("v1").unwrap();
        assert_eq!(mapping, HashMap::from([("q1".to_string(), "Name?".to_string())]));
    }

    #[test]
    fn test_export_csv_round_trip() {
        let (gateway, store) = gateway();
        let form = NodeModel::form("F", json!({ "title": "Contact", "questions": [{ "id": "legacy", "text": "Company?", "type": "text" }] }));
        store.nodes().create(&NodeRow::new("v1", &form, 0).unwrap()).unwrap();
        let summary = json!({
            "history": [],
            "variables": {
                "q1": { "value": ["a", "b"], "questionText": "Pick, two" },
                "legacy": "Acme",
                "orphan": 7
            },
            "aiReport": "Said \"hi\"\nthen left"
        });
        store.journeys().create(&journey("j1", "a,b@x.com", 0, summary)).unwrap();

        let csv = gateway.export_csv("v1").unwrap();
        let (header, body) = csv.split_once('\n').unwrap();
        assert_eq!(header, "ID,Email,Created At,AI Report,Variables");

        let fields = split_csv(body);
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[0], "j1");
        assert_eq!(fields[1], "a,b@x.com");
        assert_eq!(fields[2], "1970-01-01T00:00:00.000Z");
        assert_eq!(fields[3], "Said \"hi\"\nthen left");

        let variables: BTreeMap<String, Value> = serde_json::from_str(&fields[4]).unwrap();
        assert_eq!(variables["Pick, two"], json!(["a", "b"]));
        assert_eq!(variables["Company?"], json!("Acme"));
        assert_eq!(variables["orphan"], json!(7));
    }
}
