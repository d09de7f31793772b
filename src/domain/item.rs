//! Item Matching Strategy
//!
//! Decides which loaded item a selected value refers to. Primitive items
//! match by equality; records match by a `value_key` lookup or, when no
//! usable key is configured, by deep equality.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Kind of items a manager works with
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemKind {
    /// Strings, numbers, booleans; the item is its own value
    Primitive,
    /// Keyed records
    Record {
        /// Dotted path of the identifying field (e.g. `"id"`, `"meta.code"`)
        value_key: Option<String>,
    },
}

/// Bounds every data item satisfies
pub trait DataItem: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

impl<T> DataItem for T where T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

/// Bounds every selected value satisfies
pub trait SelectedValue: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> SelectedValue for T where T: Clone + fmt::Debug + Send + Sync + 'static {}

type MatchFn<I, V> = dyn Fn(&I, &V) -> bool + Send + Sync;
type AbsentFn<V> = dyn Fn(&V) -> bool + Send + Sync;
type ItemFn<I, V> = dyn Fn(&V) -> I + Send + Sync;

/// Item comparison strategy
pub struct ItemStrategy<I, V> {
    kind: ItemKind,
    matches: Arc<MatchFn<I, V>>,
    is_absent: Arc<AbsentFn<V>>,
    /// Builds an item straight from its value (primitives only)
    as_item: Option<Arc<ItemFn<I, V>>>,
}

impl<I, V> Clone for ItemStrategy<I, V> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            matches: self.matches.clone(),
            is_absent: self.is_absent.clone(),
            as_item: self.as_item.clone(),
        }
    }
}

impl<I, V> fmt::Debug for ItemStrategy<I, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemStrategy").field("kind", &self.kind).finish()
    }
}

impl<T: Clone + PartialEq + 'static> ItemStrategy<T, T> {
    /// Items are their own values
    pub fn primitive() -> Self {
        let mut strategy = Self::custom(ItemKind::Primitive, |item: &T, value: &T| item == value);
        let as_item: Arc<ItemFn<T, T>> = Arc::new(|value: &T| value.clone());
        strategy.as_item = Some(as_item);
        strategy
    }
}

impl ItemStrategy<Value, Value> {
    /// JSON records identified by `value_key`
    ///
    /// A missing or empty key falls back to deep equality. `null` selections
    /// are treated as absent.
    pub fn record(value_key: Option<&str>) -> Self {
        let value_key = value_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        let key = value_key.clone();
        Self::custom(ItemKind::Record { value_key }, move |item: &Value, value: &Value| {
            record_matches(item, value, key.as_deref())
        })
        .with_absent(Value::is_null)
    }
}

impl<I, V> ItemStrategy<I, V> {
    /// Strategy from an arbitrary match function
    pub fn custom(kind: ItemKind, matches: impl Fn(&I, &V) -> bool + Send + Sync + 'static) -> Self {
        Self {
            kind,
            matches: Arc::new(matches),
            is_absent: Arc::new(|_| false),
            as_item: None,
        }
    }

    /// Treat values matching `is_absent` like missing selections
    pub fn with_absent(mut self, is_absent: impl Fn(&V) -> bool + Send + Sync + 'static) -> Self {
        self.is_absent = Arc::new(is_absent);
        self
    }

    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }

    /// Check if `item` is the item identified by `value`
    pub fn matches(&self, item: &I, value: &V) -> bool {
        (self.matches)(item, value)
    }

    /// Check if `value` should be dropped from a selection
    pub fn is_absent(&self, value: &V) -> bool {
        (self.is_absent)(value)
    }

    /// The item a value stands for without loading it, if the kind allows
    pub fn item_for_value(&self, value: &V) -> Option<I> {
        self.as_item.as_ref().map(|as_item| as_item(value))
    }

    /// Best-known item for each value, in selection order
    ///
    /// Values without a matching item are skipped, so a shorter result than
    /// `values` means items are missing.
    pub fn resolve(&self, items: &[I], values: &[V]) -> Vec<I>
    where
        I: Clone,
    {
        values
            .iter()
            .filter_map(|value| items.iter().find(|item| self.matches(item, value)).cloned())
            .collect()
    }
}

/// Look up a dotted path (`"a.b.0"`) inside a JSON value
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn record_matches(item: &Value, value: &Value, value_key: Option<&str>) -> bool {
    let Some(key) = value_key else {
        return item == value;
    };

    if value.is_object() {
        // a whole record was selected: compare identities, else the records
        return match (lookup(item, key), lookup(value, key)) {
            (Some(a), Some(b)) => a == b,
            _ => item == value,
        };
    }

    lookup(item, key) == Some(value)
}
