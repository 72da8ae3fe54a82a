//! Paginated reads over the service log

use serde::Serialize;

/// Page size used when a query does not set one
pub const DEFAULT_PAGE_LIMIT: usize = 50;
/// Largest page a query may request
pub const MAX_PAGE_LIMIT: usize = 50;

/// Which namespaces the caller is allowed to read
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NamespaceScope {
    /// Administrators read every namespace
    Admin,
    /// Tenants read only the listed namespaces
    Namespaces(Vec<String>),
}

/// Filter and page selection for service-log reads
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceLogQuery {
    /// Only events for this instance
    pub instance_name: Option<String>,
    /// Only events in this namespace; takes precedence over `scope`
    pub namespace: Option<String>,
    /// Caller's visibility
    pub scope: NamespaceScope,
    /// Requested page size; 0 means the default
    pub limit: usize,
    /// Number of newest events to skip
    pub skip: usize,
}

impl Default for ServiceLogQuery {
    fn default() -> Self {
        Self {
            instance_name: None,
            namespace: None,
            scope: NamespaceScope::Admin,
            limit: DEFAULT_PAGE_LIMIT,
            skip: 0,
        }
    }
}

impl ServiceLogQuery {
    /// Page size after applying the default and the cap
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            0 => DEFAULT_PAGE_LIMIT,
            n => n.min(MAX_PAGE_LIMIT),
        }
    }

    /// Whether the query can match anything at all.
    ///
    /// A tenant with no namespaces and no explicit namespace filter sees
    /// nothing.
    pub fn is_satisfiable(&self) -> bool {
        match (&self.namespace, &self.scope) {
            (Some(_), _) | (None, NamespaceScope::Admin) => true,
            (None, NamespaceScope::Namespaces(allowed)) => !allowed.is_empty(),
        }
    }

    /// Whether an event for `instance_name` in `namespace` passes the filters
    pub fn matches(&self, instance_name: &str, namespace: &str) -> bool {
        if let Some(wanted) = &self.instance_name {
            if wanted != instance_name {
                return false;
            }
        }
        match (&self.namespace, &self.scope) {
            (Some(wanted), _) => wanted == namespace,
            (None, NamespaceScope::Admin) => true,
            (None, NamespaceScope::Namespaces(allowed)) => allowed.iter().any(|ns| ns == namespace),
        }
    }
}

/// One page of results plus the number of matching records
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page<T> {
    /// Records on this page, newest first
    pub items: Vec<T>,
    /// Total matching records across all pages
    pub total: usize,
}

impl<T> Page<T> {
    /// An empty page
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}
