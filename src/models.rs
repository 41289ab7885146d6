use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{BODY_PARAM, PAGE_TOKEN_PARAM};

/// Named request parameters sent with an API action
pub type Params = Map<String, Value>;

/// The kind of call made against the resource named by a descriptor.
///
/// `Invoke` calls the named function directly (e.g. `users.settings.getImap`)
/// instead of one of the standard collection methods beneath it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    List,
    Get,
    Create,
    Invoke,
}

impl ActionKind {
    /// Method name under the resource, `None` for direct invocations
    pub fn method_name(&self) -> Option<&'static str> {
        match self {
            ActionKind::List => Some("list"),
            ActionKind::Get => Some("get"),
            ActionKind::Create => Some("create"),
            ActionKind::Invoke => None,
        }
    }

    /// Suffix used when naming the call in logs (`users` + `.list`)
    pub fn suffix(&self) -> String {
        self.method_name().map(|m| format!(".{}", m)).unwrap_or_default()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.method_name().unwrap_or("invoke"))
    }
}

/// Where the driver sends accumulated records.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Flush to the output sink
    Persist,
    /// Hand the records back to the caller
    Return,
}

/// Description of one API action for the collection driver.
///
/// Descriptors are built once per call and never mutated by the driver;
/// each page works on a fresh copy of `params` with the page token injected.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub function: String,
    pub base: Vec<String>,
    pub params: Params,
    pub action: ActionKind,
    pub inner_field: Option<String>,
    pub page_token_param: String,
    pub wrapped_body: bool,
    pub delivery: Delivery,
    pub results_only: bool,
    pub documented_item: Option<String>,
    pub metadata_additions: Vec<(String, Value)>,
}

impl RequestDescriptor {
    pub fn new(action: ActionKind, function: &str) -> Self {
        Self {
            function: function.to_string(),
            base: Vec::new(),
            params: Params::new(),
            action,
            inner_field: None,
            page_token_param: PAGE_TOKEN_PARAM.to_string(),
            wrapped_body: false,
            delivery: Delivery::Persist,
            results_only: true,
            documented_item: None,
            metadata_additions: Vec::new(),
        }
    }

    pub fn list(function: &str) -> Self {
        Self::new(ActionKind::List, function)
    }

    pub fn get(function: &str) -> Self {
        Self::new(ActionKind::Get, function)
    }

    pub fn create(function: &str) -> Self {
        Self::new(ActionKind::Create, function)
    }

    pub fn invoke(function: &str) -> Self {
        Self::new(ActionKind::Invoke, function)
    }

    /// Nested resource path in front of the function (`users`, `settings`)
    pub fn base(mut self, segments: &[&str]) -> Self {
        self.base = segments.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    /// Field of the response holding the records
    pub fn inner(mut self, field: &str) -> Self {
        self.inner_field = Some(field.to_string());
        self
    }

    /// The request is a POST whose `body` param carries the page token
    pub fn wrapped(mut self) -> Self {
        self.wrapped_body = true;
        self
    }

    pub fn page_token_param(mut self, name: &str) -> Self {
        self.page_token_param = name.to_string();
        self
    }

    pub fn returning(mut self) -> Self {
        self.delivery = Delivery::Return;
        self
    }

    /// Persist records inside a module/function/params envelope
    pub fn with_envelope(mut self) -> Self {
        self.results_only = false;
        self
    }

    pub fn documented(mut self, item: impl Into<String>) -> Self {
        self.documented_item = Some(item.into());
        self
    }

    pub fn metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata_additions.push((key.to_string(), value.into()));
        self
    }

    /// Parameters for one page, with the continuation token injected
    pub fn params_for_page(&self, page_token: Option<&str>) -> Params {
        let mut params = self.params.clone();
        let Some(token) = page_token else {
            return params;
        };

        if self.wrapped_body {
            let body = params
                .entry(BODY_PARAM.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !body.is_object() {
                *body = Value::Object(Map::new());
            }
            if let Some(body) = body.as_object_mut() {
                body.insert(self.page_token_param.clone(), Value::String(token.to_string()));
            }
        } else {
            params.insert(self.page_token_param.clone(), Value::String(token.to_string()));
        }
        params
    }

    /// Request params merged with the metadata additions, for traceability
    pub fn display_params(&self) -> Params {
        let mut params = self.params.clone();
        for (key, value) in &self.metadata_additions {
            params.insert(key.clone(), value.clone());
        }
        params
    }

    /// `function` or `function_documenteditem`, used in artifact names
    pub fn function_item(&self) -> String {
        match &self.documented_item {
            Some(item) => format!("{}_{}", self.function, item),
            None => self.function.clone(),
        }
    }

    /// `users.list`, `getImap`, ...
    pub fn action_label(&self) -> String {
        format!("{}{}", self.function, self.action.suffix())
    }
}

/// Persisted wrapper tagging records with where they came from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResultEnvelope {
    pub module: String,
    pub function: String,
    pub params: Params,
    pub data: Vec<Value>,
}

/// Result of a single un-retried test call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub success: bool,
    pub response: Option<Value>,
    pub error: Option<String>,
}
