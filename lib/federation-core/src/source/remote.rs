use crate::error::EvaluationError;
use crate::model::{Bindings, EndpointId};
use crate::source::buffer::ConsumingBuffer;
use crate::source::trait_def::{BindingStream, TripleSource, TripleStream};
use crate::sparql_text::{render_ask, render_probe_select};
use sparesults::{QueryResultsFormat, QueryResultsParser, QueryResultsReader};
use spargebra::term::TriplePattern;
use std::sync::RwLock;
use std::time::Duration;
use url::Url;

/// A triple source backed by a real SPARQL 1.1 protocol endpoint (§4.1, §6 "Wire protocol").
///
/// Uses `reqwest`'s blocking client deliberately: the scheduler in this crate is a plain thread
/// pool (§9 "Blocking pools"), so each remote call runs on a dedicated worker thread whose stack
/// owns the HTTP connection for the call's duration, matching the connection policy in §5.
pub struct RemoteTripleSource {
    id: EndpointId,
    location: Url,
    supports_ask_queries: bool,
    max_execution_time: Duration,
    client: RwLock<reqwest::blocking::Client>,
}

impl RemoteTripleSource {
    pub fn new(id: EndpointId, location: Url, supports_ask_queries: bool, max_execution_time: Duration) -> Self {
        Self {
            id,
            location,
            supports_ask_queries,
            max_execution_time,
            client: RwLock::new(Self::build_client(max_execution_time)),
        }
    }

    fn build_client(timeout: Duration) -> reqwest::blocking::Client {
        reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new())
    }

    /// `repair`: close and reopen the underlying connection pool once before propagating an
    /// error (§5 connection policy, §7 evaluation error handling).
    fn repair(&self) {
        let mut client = self.client.write().unwrap_or_else(|poison| poison.into_inner());
        *client = Self::build_client(self.max_execution_time);
    }

    fn execute(&self, query_text: &str) -> Result<reqwest::blocking::Response, EvaluationError> {
        let client = self.client.read().unwrap_or_else(|poison| poison.into_inner());
        client
            .get(self.location.clone())
            .query(&[("query", query_text)])
            .header("Accept", "application/sparql-results+json")
            .send()
            .map_err(|source| EvaluationError::ConnectionFailed {
                endpoint: self.id.clone(),
                source,
            })
    }

    fn execute_with_repair(&self, query_text: &str) -> Result<reqwest::blocking::Response, EvaluationError> {
        match self.execute(query_text) {
            Ok(response) => Ok(response),
            Err(_first_failure) => {
                self.repair();
                self.execute(query_text)
            }
        }
    }

    fn parse_solutions(&self, response: reqwest::blocking::Response) -> Result<Vec<Bindings>, EvaluationError> {
        let body = response.bytes().map_err(|source| EvaluationError::ConnectionFailed {
            endpoint: self.id.clone(),
            source,
        })?;
        let parser = QueryResultsParser::from_format(QueryResultsFormat::Json);
        let reader = parser.for_reader(&body[..]).map_err(|error| EvaluationError::Remote {
            endpoint: self.id.clone(),
            message: error.to_string(),
        })?;
        match reader {
            QueryResultsReader::Solutions(solutions) => {
                let mut rows = Vec::new();
                for solution in solutions {
                    let solution = solution.map_err(|error| EvaluationError::Remote {
                        endpoint: self.id.clone(),
                        message: error.to_string(),
                    })?;
                    rows.push(Bindings::from_iter(solution.iter().map(|(v, t)| (v.clone(), t.clone()))));
                }
                Ok(rows)
            }
            QueryResultsReader::Boolean(value) => {
                // An ASK issued through the SELECT path; represent truth as a single empty row.
                Ok(if value { vec![Bindings::new()] } else { Vec::new() })
            }
        }
    }
}

impl TripleSource for RemoteTripleSource {
    fn evaluate(&self, query_text: &str, _bindings: Option<&Bindings>) -> Result<BindingStream, EvaluationError> {
        let response = self.execute_with_repair(query_text)?;
        let rows = self.parse_solutions(response)?;
        Ok(Box::new(ConsumingBuffer::new(64, rows.into_iter().map(Ok))))
    }

    fn ask(&self, pattern: &TriplePattern) -> Result<bool, EvaluationError> {
        let query_text = if self.supports_ask_queries {
            render_ask(pattern)
        } else {
            render_probe_select(pattern)
        };
        let response = self.execute_with_repair(&query_text)?;
        if self.supports_ask_queries {
            let body = response.bytes().map_err(|source| EvaluationError::ConnectionFailed {
                endpoint: self.id.clone(),
                source,
            })?;
            let parser = QueryResultsParser::from_format(QueryResultsFormat::Json);
            let reader = parser.for_reader(&body[..]).map_err(|error| EvaluationError::Remote {
                endpoint: self.id.clone(),
                message: error.to_string(),
            })?;
            match reader {
                QueryResultsReader::Boolean(value) => Ok(value),
                QueryResultsReader::Solutions(solutions) => Ok(solutions.count() > 0),
            }
        } else {
            Ok(!self.parse_solutions(response)?.is_empty())
        }
    }

    fn get_statements(&self, pattern: &TriplePattern) -> Result<TripleStream, EvaluationError> {
        let query_text = render_probe_select(pattern);
        let response = self.execute_with_repair(&query_text)?;
        let rows = self.parse_solutions(response)?;
        let subject = pattern.subject.clone();
        let predicate = pattern.predicate.clone();
        let object = pattern.object.clone();
        let triples = rows.into_iter().filter_map(move |row| {
            crate::source::local::reify_pattern(&subject, &predicate, &object, &row)
        });
        Ok(Box::new(ConsumingBuffer::new(64, triples.map(Ok))))
    }

    fn uses_prepared_query(&self) -> bool {
        true
    }
}
