use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use harvest_common::sparql::{Binding, GraphClient, SparqlError, SparqlResponse, SparqlResults, Term};

/// Scripted in-memory store: queries pop pre-arranged responses in order,
/// updates are acknowledged and recorded. Running out of scripted responses
/// is a test bug and fails the query.
#[derive(Default)]
pub struct FakeStore {
    responses: Mutex<VecDeque<SparqlResponse>>,
    queries: Mutex<Vec<String>>,
    updates: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn new() -> Self {
        FakeStore::default()
    }

    pub fn push_response(&self, response: SparqlResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn push_bindings(&self, bindings: Vec<Binding>) {
        self.push_response(SparqlResponse {
            results: Some(SparqlResults { bindings }),
            boolean: None,
        });
    }

    pub fn push_empty(&self) {
        self.push_bindings(Vec::new());
    }

    pub fn push_count(&self, variable: &str, count: u64) {
        self.push_bindings(vec![Binding::from_pairs([(
            variable,
            Term::literal(count.to_string()),
        )])]);
    }

    pub fn push_boolean(&self, value: bool) {
        self.push_response(SparqlResponse {
            results: None,
            boolean: Some(value),
        });
    }

    pub fn recorded_queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn recorded_updates(&self) -> Vec<String> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl GraphClient for FakeStore {
    async fn query(&self, query: &str) -> Result<SparqlResponse, SparqlError> {
        self.queries.lock().unwrap().push(query.to_owned());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| SparqlError::Response(format!("no scripted response for: {query}")))
    }

    async fn update(&self, update: &str) -> Result<(), SparqlError> {
        self.updates.lock().unwrap().push(update.to_owned());
        Ok(())
    }
}
