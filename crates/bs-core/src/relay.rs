//! Relay capability table
//!
//! The request proxy exposes the same surface as the native request type.
//! That surface is declared once, here, as a static table of named
//! properties and methods; the proxy and the native adapters consume it
//! instead of enumerating names at runtime.

// =============================================================================
// Properties
// =============================================================================

/// A relayed property of the request surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    ReadyState,
    ResponseXml,
    Upload,
    ResponseUrl,
    ResponseType,
    Method,
    OnTimeout,
    Timeout,
    WithCredentials,
    OnLoad,
    OnError,
    OnProgress,
}

/// How a property is relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Reads come from the native instance; writes are refused
    ReadOnly,
    /// Reads and writes go straight to the native instance
    ReadWrite,
}

/// A passthrough method of the request surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    AddEventListener,
    Open,
    Send,
    Abort,
    GetAllResponseHeaders,
    GetResponseHeader,
    OverrideMimeType,
    SetRequestHeader,
    /// Verb-capturing helper; never reaches the native instance
    SetMethod,
}

/// One entry of the capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Property(&'static str, Property, Access),
    Method(&'static str, Operation),
}

impl Capability {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Property(name, _, _) | Self::Method(name, _) => name,
        }
    }
}

/// The relay surface. Names are the page-facing (JavaScript) spellings.
pub const CAPABILITIES: &[Capability] = &[
    Capability::Property("readyState", Property::ReadyState, Access::ReadOnly),
    Capability::Property("responseXML", Property::ResponseXml, Access::ReadOnly),
    Capability::Property("upload", Property::Upload, Access::ReadOnly),
    Capability::Property("responseURL", Property::ResponseUrl, Access::ReadOnly),
    Capability::Property("responseType", Property::ResponseType, Access::ReadWrite),
    Capability::Property("method", Property::Method, Access::ReadWrite),
    Capability::Property("ontimeout", Property::OnTimeout, Access::ReadWrite),
    Capability::Property("timeout", Property::Timeout, Access::ReadWrite),
    Capability::Property("withCredentials", Property::WithCredentials, Access::ReadWrite),
    Capability::Property("onload", Property::OnLoad, Access::ReadWrite),
    Capability::Property("onerror", Property::OnError, Access::ReadWrite),
    Capability::Property("onprogress", Property::OnProgress, Access::ReadWrite),
    Capability::Method("addEventListener", Operation::AddEventListener),
    Capability::Method("open", Operation::Open),
    Capability::Method("send", Operation::Send),
    Capability::Method("abort", Operation::Abort),
    Capability::Method("getAllResponseHeaders", Operation::GetAllResponseHeaders),
    Capability::Method("getResponseHeader", Operation::GetResponseHeader),
    Capability::Method("overrideMimeType", Operation::OverrideMimeType),
    Capability::Method("setRequestHeader", Operation::SetRequestHeader),
    Capability::Method("setMethod", Operation::SetMethod),
];

impl Property {
    fn entry(self) -> (&'static str, Access) {
        CAPABILITIES
            .iter()
            .find_map(|cap| match *cap {
                Capability::Property(name, prop, access) if prop == self => Some((name, access)),
                _ => None,
            })
            .unwrap_or(("", Access::ReadOnly))
    }

    /// Page-facing name.
    pub fn name(self) -> &'static str {
        self.entry().0
    }

    pub fn access(self) -> Access {
        self.entry().1
    }

    pub fn is_writable(self) -> bool {
        self.access() == Access::ReadWrite
    }

    pub fn from_name(name: &str) -> Option<Self> {
        CAPABILITIES.iter().find_map(|cap| match *cap {
            Capability::Property(n, prop, _) if n == name => Some(prop),
            _ => None,
        })
    }

    /// All relayed properties, in table order.
    pub fn all() -> impl Iterator<Item = Property> {
        CAPABILITIES.iter().filter_map(|cap| match *cap {
            Capability::Property(_, prop, _) => Some(prop),
            _ => None,
        })
    }
}

impl Operation {
    /// Page-facing name.
    pub fn name(self) -> &'static str {
        CAPABILITIES
            .iter()
            .find_map(|cap| match *cap {
                Capability::Method(name, op) if op == self => Some(name),
                _ => None,
            })
            .unwrap_or("")
    }

    pub fn from_name(name: &str) -> Option<Self> {
        CAPABILITIES.iter().find_map(|cap| match *cap {
            Capability::Method(n, op) if n == name => Some(op),
            _ => None,
        })
    }

    /// Whether the call records the request verb.
    pub fn captures_verb(self) -> bool {
        matches!(self, Self::Open | Self::SetMethod)
    }

    /// All passthrough methods, in table order.
    pub fn all() -> impl Iterator<Item = Operation> {
        CAPABILITIES.iter().filter_map(|cap| match *cap {
            Capability::Method(_, op) => Some(op),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_variant_is_in_table() {
        let props: HashSet<Property> = Property::all().collect();
        assert_eq!(props.len(), 12);
        for prop in &props {
            assert!(!prop.name().is_empty(), "{:?} has no table entry", prop);
        }

        let ops: HashSet<Operation> = Operation::all().collect();
        assert_eq!(ops.len(), 9);
        for op in &ops {
            assert!(!op.name().is_empty(), "{:?} has no table entry", op);
        }
    }

    #[test]
    fn test_names_are_unique() {
        let names: HashSet<&str> = CAPABILITIES.iter().map(Capability::name).collect();
        assert_eq!(names.len(), CAPABILITIES.len());
    }

    #[test]
    fn test_access() {
        assert_eq!(Property::ReadyState.access(), Access::ReadOnly);
        assert_eq!(Property::ResponseXml.access(), Access::ReadOnly);
        assert!(Property::ResponseType.is_writable());
        assert!(Property::Timeout.is_writable());
        assert!(Property::Method.is_writable());
    }

    #[test]
    fn test_name_lookup() {
        assert_eq!(Property::from_name("withCredentials"), Some(Property::WithCredentials));
        assert_eq!(Property::from_name("status"), None);
        assert_eq!(Operation::from_name("setRequestHeader"), Some(Operation::SetRequestHeader));
        assert_eq!(Operation::Open.name(), "open");
        assert!(Operation::Open.captures_verb());
        assert!(!Operation::Send.captures_verb());
    }
}
