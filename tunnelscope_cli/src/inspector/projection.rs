//! Filtered, newest-first views over the joined request list

use super::store::RequestResponse;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeSet;
use tunnelscope_common::Method;

/// Set of methods shown in the list. Empty means nothing is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodFilter {
    enabled: BTreeSet<Method>,
}

impl MethodFilter {
    /// Every method enabled
    pub fn any() -> Self {
        Self {
            enabled: Method::ALL.into_iter().collect(),
        }
    }

    /// Nothing enabled
    pub fn none() -> Self {
        Self {
            enabled: BTreeSet::new(),
        }
    }

    /// Only one method enabled
    pub fn only(method: Method) -> Self {
        Self {
            enabled: BTreeSet::from([method]),
        }
    }

    pub fn from_methods(methods: impl IntoIterator<Item = Method>) -> Self {
        Self {
            enabled: methods.into_iter().collect(),
        }
    }

    pub fn toggle(&mut self, method: Method) {
        if !self.enabled.remove(&method) {
            self.enabled.insert(method);
        }
    }

    pub fn contains(&self, method: Method) -> bool {
        self.enabled.contains(&method)
    }

    pub fn is_any(&self) -> bool {
        self.enabled.len() == Method::ALL.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }

    /// Short label for the filter bar
    pub fn label(&self) -> &'static str {
        if self.is_any() {
            return "ANY";
        }
        if self.is_empty() {
            return "NONE";
        }
        self.single().map(|m| m.as_str()).unwrap_or("CUSTOM")
    }

    /// Step ANY -> GET -> HEAD -> ... -> PATCH -> ANY
    pub fn cycle(&mut self) {
        let next = match self.single() {
            _ if self.is_any() => Some(Method::ALL[0]),
            Some(current) => Method::ALL
                .iter()
                .position(|m| *m == current)
                .and_then(|i| Method::ALL.get(i + 1).copied()),
            None => None,
        };
        *self = next.map(Self::only).unwrap_or_else(Self::any);
    }

    fn single(&self) -> Option<Method> {
        match self.enabled.len() {
            1 => self.enabled.iter().next().copied(),
            _ => None,
        }
    }
}

impl Default for MethodFilter {
    fn default() -> Self {
        Self::any()
    }
}

/// Presentation-owned filter state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewFilter {
    pub methods: MethodFilter,
    pub search: String,
    pub regex: bool,
}

impl ViewFilter {
    /// Build the matcher for the current search settings.
    ///
    /// An invalid pattern matches everything; the compile error is kept so
    /// the UI can flag it.
    pub fn compile(&self) -> CompiledFilter {
        let mut compiled = CompiledFilter {
            methods: self.methods.clone(),
            matcher: None,
            error: None,
        };

        if self.search.is_empty() {
            return compiled;
        }

        let pattern = if self.regex {
            self.search.clone()
        } else {
            regex::escape(&self.search)
        };

        match RegexBuilder::new(&pattern).case_insensitive(true).build() {
            Ok(re) => compiled.matcher = Some(re),
            Err(e) => {
                tracing::debug!("Invalid search pattern {:?}: {}", self.search, e);
                compiled.error = Some(e.to_string());
            }
        }
        compiled
    }
}

/// A view filter ready to be applied
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    methods: MethodFilter,
    matcher: Option<Regex>,
    error: Option<String>,
}

impl CompiledFilter {
    /// Compile error of the search pattern, if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn matches(&self, pair: &RequestResponse) -> bool {
        let request = &pair.request;
        if !self.methods.contains(request.method) {
            return false;
        }
        match &self.matcher {
            Some(re) => re.is_match(&format!("{} {}", request.method, request.path)),
            None => true,
        }
    }
}

/// Matching pairs, most recent first, with their arrival index
pub fn project<'a>(
    pairs: &'a [RequestResponse],
    filter: &CompiledFilter,
) -> Vec<(usize, &'a RequestResponse)> {
    pairs
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, pair)| filter.matches(pair))
        .collect()
}
