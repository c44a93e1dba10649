//! Method filters for bound routes.
//!
//! Management endpoints accept an explicit, non-empty set of methods
//! (`GET /system/functions`, `GET,DELETE /system/metrics`). Proxy and
//! invoke endpoints forward whatever the caller sent, so they accept any
//! method at all.

use std::fmt;

use http::Method;

/// The set of HTTP methods a route answers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Methods {
    /// Every method, including extension methods.
    Any,
    /// Exactly these methods. Never empty.
    Only(Vec<Method>),
}

impl Methods {
    /// A single method.
    pub fn one(method: Method) -> Self {
        Self::Only(vec![method])
    }

    /// An explicit set. Duplicates are dropped, order is preserved.
    ///
    /// # Panics
    ///
    /// Panics if `methods` is empty: a route that answers nothing is a
    /// programming error in the binding table.
    pub fn of(methods: &[Method]) -> Self {
        assert!(!methods.is_empty(), "a route needs at least one method");
        let mut set: Vec<Method> = Vec::with_capacity(methods.len());
        for m in methods {
            if !set.contains(m) {
                set.push(m.clone());
            }
        }
        Self::Only(set)
    }

    pub fn allows(&self, method: &Method) -> bool {
        match self {
            Self::Any => true,
            Self::Only(set) => set.contains(method),
        }
    }
}

impl fmt::Display for Methods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Only(set) => {
                for (i, m) in set.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    f.write_str(m.as_str())?;
                }
                Ok(())
            }
        }
    }
}
