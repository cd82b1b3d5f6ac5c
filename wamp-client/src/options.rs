//! Options for register, subscribe and publish requests.

use serde_json::Value;
use wamp_core::{Dict, InvocationPolicy, MatchPolicy};

#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    pub disclose_caller: Option<bool>,
    pub match_policy: Option<MatchPolicy>,
    pub invoke: Option<InvocationPolicy>,
    pub extra: Dict,
}

impl RegisterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disclose_caller(mut self, disclose: bool) -> Self {
        self.disclose_caller = Some(disclose);
        self
    }

    pub fn match_policy(mut self, policy: MatchPolicy) -> Self {
        self.match_policy = Some(policy);
        self
    }

    pub fn invoke(mut self, policy: InvocationPolicy) -> Self {
        self.invoke = Some(policy);
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub(crate) fn to_dict(&self) -> Dict {
        let mut options = self.extra.clone();
        if let Some(disclose) = self.disclose_caller {
            options.insert("disclose_caller".into(), Value::from(disclose));
        }
        if let Some(policy) = self.match_policy {
            options.insert("match".into(), Value::from(policy.as_str()));
        }
        if let Some(policy) = self.invoke {
            options.insert("invoke".into(), Value::from(policy.as_str()));
        }
        options
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    pub match_policy: Option<MatchPolicy>,
    pub node_key: Option<String>,
    pub extra: Dict,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn match_policy(mut self, policy: MatchPolicy) -> Self {
        self.match_policy = Some(policy);
        self
    }

    pub fn node_key(mut self, key: impl Into<String>) -> Self {
        self.node_key = Some(key.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub(crate) fn to_dict(&self) -> Dict {
        let mut options = self.extra.clone();
        if let Some(policy) = self.match_policy {
            options.insert("match".into(), Value::from(policy.as_str()));
        }
        if let Some(key) = &self.node_key {
            options.insert("nkey".into(), Value::from(key.clone()));
        }
        options
    }
}

/// Which sessions an event is delivered to.
///
/// Session ids, auth ids and auth roles can be excluded or listed as the
/// only eligible receivers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipientFilter {
    pub exclude: Vec<u64>,
    pub exclude_authid: Vec<String>,
    pub exclude_authrole: Vec<String>,
    pub eligible: Vec<u64>,
    pub eligible_authid: Vec<String>,
    pub eligible_authrole: Vec<String>,
}

impl RecipientFilter {
    fn write_into(&self, options: &mut Dict) {
        fn put<T: Clone + Into<Value>>(options: &mut Dict, key: &str, values: &[T]) {
            if !values.is_empty() {
                let list = values.iter().cloned().map(Into::into).collect();
                options.insert(key.into(), Value::Array(list));
            }
        }

        put(options, "exclude", &self.exclude);
        put(options, "exclude_authid", &self.exclude_authid);
        put(options, "exclude_authrole", &self.exclude_authrole);
        put(options, "eligible", &self.eligible);
        put(options, "eligible_authid", &self.eligible_authid);
        put(options, "eligible_authrole", &self.eligible_authrole);
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Wait for the broker to confirm with PUBLISHED.
    pub acknowledge: bool,
    pub recipients: RecipientFilter,
    pub exclude_me: Option<bool>,
    pub disclose_me: Option<bool>,
    pub resource_key: Option<String>,
    pub extra: Dict,
}

impl PublishOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acknowledge(mut self, acknowledge: bool) -> Self {
        self.acknowledge = acknowledge;
        self
    }

    pub fn recipients(mut self, filter: RecipientFilter) -> Self {
        self.recipients = filter;
        self
    }

    pub fn exclude_me(mut self, exclude: bool) -> Self {
        self.exclude_me = Some(exclude);
        self
    }

    pub fn disclose_me(mut self, disclose: bool) -> Self {
        self.disclose_me = Some(disclose);
        self
    }

    pub fn resource_key(mut self, key: impl Into<String>) -> Self {
        self.resource_key = Some(key.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub(crate) fn to_dict(&self) -> Dict {
        let mut options = self.extra.clone();
        if self.acknowledge {
            options.insert("acknowledge".into(), Value::Bool(true));
        }
        self.recipients.write_into(&mut options);
        if let Some(exclude) = self.exclude_me {
            options.insert("exclude_me".into(), Value::from(exclude));
        }
        if let Some(disclose) = self.disclose_me {
            options.insert("disclose_me".into(), Value::from(disclose));
        }
        if let Some(key) = &self.resource_key {
            options.insert("rkey".into(), Value::from(key.clone()));
        }
        options
    }
}
