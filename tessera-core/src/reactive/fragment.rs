//! Fragment Implementation
//!
//! A Fragment is a lazily recomputed, keyable unit of rendered markup.
//!
//! # How Fragments Work
//!
//! 1. A tracked render call evaluates its closure inside a tracking scope,
//!    caches the output and keeps the closure for later.
//!
//! 2. When a cell it read changes, the fragment is marked stale: the cached
//!    children are cleared and the fragment is added to its runtime's stale
//!    set. No work happens yet.
//!
//! 3. The next time the fragment is serialized (directly, as part of a
//!    parent, or during a flush) the closure runs again in a fresh tracking
//!    scope and the result is cached.
//!
//! States move `Fresh -> Stale -> Fresh`. Content fragments have no closure
//! and are always fresh.
//!
//! # Addressing
//!
//! A fragment's `(key, index)` address is assigned at most once, by the
//! nearest container that embeds it while it is still unaddressed. See
//! [`crate::markup::element`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::context::{Reads, TrackingScope};
use super::ids::FragmentId;
use super::runtime::StaleSet;

/// A render closure, re-invocable with its captured arguments.
pub type RenderFn = Arc<dyn Fn() -> Markup + Send + Sync>;

/// Generated identifier of a container that owns at least one fragment.
///
/// Emitted on the container as `key="<id>"` so the client can find it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// Generate a new process-unique key.
    pub fn generate() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(format!("k{:x}", COUNTER.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of a fragment inside its owning container.
///
/// A positional child replaces a subtree; an attribute index replaces the
/// value of the named attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Index {
    Position(usize),
    Attribute(String),
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Index::Position(position) => write!(f, "{}", position),
            Index::Attribute(name) => f.write_str(name),
        }
    }
}

/// The client-side address of a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub key: Key,
    pub index: Index,
}

/// One piece of rendered output.
#[derive(Debug, Clone)]
pub enum Segment {
    Text(String),
    Fragment(Fragment),
}

/// A sequence of literal text interleaved with fragments.
///
/// Adjacent text is concatenated on insertion, so a `Markup` never holds two
/// consecutive `Text` segments.
#[derive(Debug, Clone, Default)]
pub struct Markup {
    segments: Vec<Segment>,
}

impl Markup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_str(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.segments.last_mut() {
            Some(Segment::Text(last)) => last.push_str(text),
            _ => self.segments.push(Segment::Text(text.to_string())),
        }
    }

    pub fn push_fragment(&mut self, fragment: Fragment) {
        self.segments.push(Segment::Fragment(fragment));
    }

    pub fn push(&mut self, segment: Segment) {
        match segment {
            Segment::Text(text) => self.push_str(&text),
            Segment::Fragment(fragment) => self.push_fragment(fragment),
        }
    }

    /// Splice another markup sequence onto the end of this one.
    pub fn append(&mut self, other: Markup) {
        for segment in other.segments {
            self.push(segment);
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Fragments embedded directly in this sequence.
    pub fn fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Fragment(fragment) => Some(fragment),
            Segment::Text(_) => None,
        })
    }

    /// Serialize, recomputing stale fragments on demand.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        write_segments(&self.segments, &mut out);
        out
    }
}

impl From<&str> for Markup {
    fn from(text: &str) -> Self {
        let mut markup = Markup::new();
        markup.push_str(text);
        markup
    }
}

impl From<String> for Markup {
    fn from(text: String) -> Self {
        Markup::from(text.as_str())
    }
}

impl From<Fragment> for Markup {
    fn from(fragment: Fragment) -> Self {
        let mut markup = Markup::new();
        markup.push_fragment(fragment);
        markup
    }
}

impl From<Vec<Segment>> for Markup {
    fn from(segments: Vec<Segment>) -> Self {
        segments.into_iter().collect()
    }
}

impl FromIterator<Segment> for Markup {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        let mut markup = Markup::new();
        for segment in iter {
            markup.push(segment);
        }
        markup
    }
}

impl fmt::Display for Markup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_html())
    }
}

fn write_segments(segments: &[Segment], out: &mut String) {
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Fragment(fragment) => fragment.write_html(out),
        }
    }
}

/// Recompute state of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentState {
    /// The cached children are current.
    Fresh,

    /// A cell this fragment read has changed; the children were cleared and
    /// will be recomputed on the next serialization.
    Stale,
}

struct Cache {
    state: FragmentState,
    /// Bumped on every invalidation. A recompute that started before a newer
    /// invalidation does not mark the fragment fresh.
    epoch: u64,
    children: Arc<[Segment]>,
}

pub(crate) struct FragmentNode {
    id: FragmentId,
    address: OnceLock<Address>,
    cache: Mutex<Cache>,
    render: Option<RenderFn>,
    stale_set: Option<Arc<StaleSet>>,
    /// Cells read by the last evaluation.
    reads: Mutex<Reads>,
}

impl FragmentNode {
    /// Clear the cached children and schedule this fragment for the next
    /// flush.
    pub(crate) fn mark_stale(self: &Arc<Self>) {
        if self.render.is_none() {
            return;
        }
        {
            let mut cache = self.cache.lock();
            cache.state = FragmentState::Stale;
            cache.epoch = cache.epoch.wrapping_add(1);
            cache.children = Arc::from(Vec::new());
        }
        if let Some(stale_set) = &self.stale_set {
            stale_set.insert(self.id, Arc::downgrade(self));
        }
    }
}

/// A lazily recomputed, keyable unit of rendered markup.
///
/// Fragments are cheap to clone; clones share the same node. A node is
/// reclaimed once no markup holds a strong reference to it.
#[derive(Clone)]
pub struct Fragment {
    node: Arc<FragmentNode>,
}

impl Fragment {
    /// Create a pure content fragment from already-resolved markup.
    pub fn content(markup: impl Into<Markup>) -> Self {
        let markup = markup.into();
        Self {
            node: Arc::new(FragmentNode {
                id: FragmentId::new(),
                address: OnceLock::new(),
                cache: Mutex::new(Cache {
                    state: FragmentState::Fresh,
                    epoch: 0,
                    children: Arc::from(markup.into_segments()),
                }),
                render: None,
                stale_set: None,
                reads: Mutex::new(Reads::new()),
            }),
        }
    }

    /// Evaluate `render` in a tracking scope and wrap the result.
    ///
    /// Every cell read during the evaluation registers the new fragment as a
    /// dependent. Invalidations are reported to `stale_set`.
    pub(crate) fn tracked(render: RenderFn, stale_set: Arc<StaleSet>) -> Self {
        let (markup, reads) = evaluate(&render);

        let fragment = Self {
            node: Arc::new(FragmentNode {
                id: FragmentId::new(),
                address: OnceLock::new(),
                cache: Mutex::new(Cache {
                    state: FragmentState::Fresh,
                    epoch: 0,
                    children: Arc::from(markup.into_segments()),
                }),
                render: Some(render),
                stale_set: Some(stale_set),
                reads: Mutex::new(Reads::new()),
            }),
        };
        fragment.register(reads);
        fragment
    }

    pub fn id(&self) -> FragmentId {
        self.node.id
    }

    pub fn address(&self) -> Option<&Address> {
        self.node.address.get()
    }

    pub fn key(&self) -> Option<&Key> {
        self.address().map(|address| &address.key)
    }

    pub fn index(&self) -> Option<&Index> {
        self.address().map(|address| &address.index)
    }

    pub fn is_addressed(&self) -> bool {
        self.node.address.get().is_some()
    }

    /// Assign an address if none has been assigned yet.
    ///
    /// Returns `false`, leaving the fragment untouched, when it is already
    /// addressed.
    pub(crate) fn claim(&self, address: Address) -> bool {
        self.node.address.set(address).is_ok()
    }

    pub fn state(&self) -> FragmentState {
        self.node.cache.lock().state
    }

    pub fn is_stale(&self) -> bool {
        self.state() == FragmentState::Stale
    }

    /// Whether this fragment carries a render closure.
    pub fn is_recomputable(&self) -> bool {
        self.node.render.is_some()
    }

    /// Fragments in the cached children. A stale fragment has none.
    pub fn children(&self) -> Vec<Fragment> {
        let children = Arc::clone(&self.node.cache.lock().children);
        children
            .iter()
            .filter_map(|segment| match segment {
                Segment::Fragment(fragment) => Some(fragment.clone()),
                Segment::Text(_) => None,
            })
            .collect()
    }

    /// Serialize this fragment, recomputing it and any stale descendants.
    pub fn html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    pub(crate) fn write_html(&self, out: &mut String) {
        let children = self.materialize();
        write_segments(&children, out);
    }

    pub fn ptr_eq(&self, other: &Fragment) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    pub(crate) fn downgrade(&self) -> Weak<FragmentNode> {
        Arc::downgrade(&self.node)
    }

    pub(crate) fn from_node(node: Arc<FragmentNode>) -> Self {
        Self { node }
    }

    /// Return the cached children, running the render closure first if the
    /// fragment is stale.
    ///
    /// No lock is held while the closure runs.
    fn materialize(&self) -> Arc<[Segment]> {
        let render = match &self.node.render {
            Some(render) => render,
            None => return Arc::clone(&self.node.cache.lock().children),
        };

        let epoch = {
            let cache = self.node.cache.lock();
            if cache.state == FragmentState::Fresh {
                return Arc::clone(&cache.children);
            }
            cache.epoch
        };

        let (markup, reads) = evaluate(render);
        let children: Arc<[Segment]> = Arc::from(markup.into_segments());
        self.register(reads);

        let mut cache = self.node.cache.lock();
        if cache.epoch == epoch {
            cache.children = Arc::clone(&children);
            cache.state = FragmentState::Fresh;
        }
        children
    }

    /// Replace the recorded read set, registering with newly read cells and
    /// unregistering from cells the evaluation no longer read.
    fn register(&self, reads: Reads) {
        let mut previous = self.node.reads.lock();
        for old in previous.iter() {
            let id = old.cell_id();
            if !reads.iter().any(|dependency| dependency.cell_id() == id) {
                old.remove_dependent(self.node.id);
            }
        }
        for dependency in &reads {
            dependency.add_dependent(self.node.id, self.downgrade());
        }
        *previous = reads;
    }
}

fn evaluate(render: &RenderFn) -> (Markup, Reads) {
    let scope = TrackingScope::enter();
    let markup = render();
    let reads = scope.finish();
    (markup, reads)
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.html())
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("id", &self.node.id)
            .field("address", &self.address())
            .field("state", &self.state())
            .field("recomputable", &self.is_recomputable())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
