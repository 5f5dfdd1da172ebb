//! Host Binding
//!
//! The boundary between the engine and whatever renders state: a UI page,
//! a component, a terminal view. The engine knows nothing about the host
//! beyond the [`Host`] trait.
//!
//! # How It Works
//!
//! [`use_setup`] runs a setup function, wraps its result with
//! [`Reactivity::proxy_refs`] and deep-watches it with `immediate`. On every
//! callback the result is split into data fields and callable methods;
//! methods are bound to the host and the fields are pushed with
//! [`Host::set_data`].

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::Result;
use crate::reactive::{AutoUnwrap, Reactivity, WatchHandle, WatchOptions, WatchSource};
use crate::value::{Method, Value};

/// Something that displays state produced by a setup function.
pub trait Host: Send + Sync {
    /// Replace the host's data with the current field values.
    fn set_data(&self, fields: IndexMap<Arc<str>, Value>);

    /// Expose a callable under `name`.
    fn bind_method(&self, name: Arc<str>, method: Method);
}

/// A setup result split by kind.
#[derive(Debug, Clone, Default)]
pub struct Split {
    pub fields: IndexMap<Arc<str>, Value>,
    pub methods: IndexMap<Arc<str>, Method>,
}

/// Separate callable entries from data entries. Ref fields are unwrapped.
pub fn split_fields_and_methods(view: &AutoUnwrap) -> Split {
    let mut split = Split::default();
    for (key, value) in view.entries() {
        let name = key.property_name();
        match value {
            Value::Function(method) => {
                split.methods.insert(name, method);
            }
            other => {
                split.fields.insert(name, other);
            }
        }
    }
    split
}

/// Bind the result of `setup` to `host` and keep it in sync.
///
/// The returned handle stops the binding; dropping it does not.
pub fn use_setup<H, S>(ctx: &Reactivity, host: Arc<H>, setup: S) -> Result<WatchHandle<AutoUnwrap>>
where
    H: Host + 'static,
    S: FnOnce() -> Value,
{
    let view = ctx.proxy_refs(setup())?;

    let handle = ctx.watch(
        WatchSource::deep(view),
        move |view: &AutoUnwrap, _, _| {
            let Split { fields, methods } = split_fields_and_methods(view);
            debug!(
                fields = fields.len(),
                methods = methods.len(),
                "pushing setup result to host"
            );
            for (name, method) in methods {
                host.bind_method(name, method);
            }
            host.set_data(fields);
        },
        WatchOptions::new().immediate(),
    );
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Raw;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingHost {
        data: Mutex<Vec<IndexMap<Arc<str>, Value>>>,
        methods: Mutex<Vec<Arc<str>>>,
    }

    impl Host for RecordingHost {
        fn set_data(&self, fields: IndexMap<Arc<str>, Value>) {
            self.data.lock().push(fields);
        }

        fn bind_method(&self, name: Arc<str>, _method: Method) {
            self.methods.lock().push(name);
        }
    }

    #[test]
    fn split_separates_methods() {
        let ctx = Reactivity::new();
        let count = ctx.make_ref(1);
        let raw = Raw::record([
            ("count", Value::from(count)),
            ("inc", Value::from(Method::new(|_| Value::Undefined))),
        ]);
        let view = ctx.proxy_refs(raw).unwrap();

        let split = split_fields_and_methods(&view);
        assert_eq!(split.fields.get("count"), Some(&Value::from(1)));
        assert!(split.methods.contains_key("inc"));
        assert!(!split.fields.contains_key("inc"));
    }

    #[test]
    fn use_setup_pushes_on_every_change() {
        let ctx = Reactivity::new();
        let host = Arc::new(RecordingHost::default());
        let count = ctx.make_ref(0);

        let setup_count = count.clone();
        let binding = use_setup(&ctx, Arc::clone(&host), move || {
            let increment = {
                let count = setup_count.clone();
                Method::new(move |_| {
                    let next = count.get().as_number().unwrap_or(0.0) + 1.0;
                    let _ = count.set(next);
                    Value::Undefined
                })
            };
            Value::from(Raw::record([
                ("count", Value::from(setup_count)),
                ("increment", Value::from(increment)),
            ]))
        })
        .unwrap();

        assert_eq!(host.data.lock().len(), 1);
        assert_eq!(host.data.lock()[0].get("count"), Some(&Value::from(0)));
        assert_eq!(*host.methods.lock(), vec![Arc::<str>::from("increment")]);

        count.set(5).unwrap();
        assert_eq!(host.data.lock().len(), 2);
        assert_eq!(host.data.lock()[1].get("count"), Some(&Value::from(5)));

        binding.stop();
        count.set(6).unwrap();
        assert_eq!(host.data.lock().len(), 2);
    }
}
