//! Keying Assembler
//!
//! Builds containers and assigns each bare fragment embedded in them a
//! stable `(key, index)` address.
//!
//! # Algorithm
//!
//! Children and attribute values are processed in declaration order:
//!
//! 1. A bare fragment passed as the child at position `p` is claimed with
//!    `index = p` and `key =` this container's generated key.
//! 2. A bare fragment passed as the value of attribute `name` is claimed
//!    with `index = name`, so the client replaces the attribute rather than
//!    a subtree.
//! 3. A fragment that already has an address is passed through untouched.
//!    Containers are built innermost-first, so such a fragment belongs to a
//!    nested container and must not be re-claimed by this one.
//! 4. Markup produced by another container is spliced in place. It
//!    occupies one child position and is never inspected for fragments.
//!
//! If and only if at least one address was claimed, the container emits
//! `key="<id>"` on itself. Attributes are emitted sorted by name.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::reactive::{Address, Callback, Fragment, Index, Key, Markup};

/// A child of a container.
#[derive(Debug, Clone)]
pub enum Child {
    /// Raw markup text, emitted as-is.
    Text(String),
    Fragment(Fragment),
    /// Output of another container.
    Markup(Markup),
}

impl From<&str> for Child {
    fn from(text: &str) -> Self {
        Child::Text(text.to_string())
    }
}

impl From<String> for Child {
    fn from(text: String) -> Self {
        Child::Text(text)
    }
}

impl From<Fragment> for Child {
    fn from(fragment: Fragment) -> Self {
        Child::Fragment(fragment)
    }
}

impl From<&Fragment> for Child {
    fn from(fragment: &Fragment) -> Self {
        Child::Fragment(fragment.clone())
    }
}

impl From<Markup> for Child {
    fn from(markup: Markup) -> Self {
        Child::Markup(markup)
    }
}

impl From<Element> for Child {
    fn from(element: Element) -> Self {
        Child::Markup(element.build())
    }
}

impl From<VoidElement> for Child {
    fn from(element: VoidElement) -> Self {
        Child::Markup(element.build())
    }
}

/// An attribute value.
#[derive(Debug, Clone)]
pub enum AttrValue {
    /// Escaped on output.
    Text(String),
    /// `true` renders the bare attribute name, `false` omits it.
    Flag(bool),
    /// Reactive value; the client patches the attribute in place.
    Fragment(Fragment),
}

impl From<&str> for AttrValue {
    fn from(text: &str) -> Self {
        AttrValue::Text(text.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(text: String) -> Self {
        AttrValue::Text(text)
    }
}

impl From<bool> for AttrValue {
    fn from(flag: bool) -> Self {
        AttrValue::Flag(flag)
    }
}

impl From<Fragment> for AttrValue {
    fn from(fragment: Fragment) -> Self {
        AttrValue::Fragment(fragment)
    }
}

impl From<&Fragment> for AttrValue {
    fn from(fragment: &Fragment) -> Self {
        AttrValue::Fragment(fragment.clone())
    }
}

impl From<&Callback> for AttrValue {
    fn from(callback: &Callback) -> Self {
        AttrValue::Text(callback.script())
    }
}

impl From<Callback> for AttrValue {
    fn from(callback: Callback) -> Self {
        AttrValue::from(&callback)
    }
}

/// Escape a string for use inside a double-quoted attribute.
///
/// `&`, `<`, `>`, `"`, `'` and `/` are replaced by entities.
pub fn escape_attr(value: &str) -> String {
    v_htmlescape::escape(value).to_string()
}

/// A container element under construction.
#[derive(Debug, Clone)]
pub struct Element {
    tag: Cow<'static, str>,
    children: Vec<Child>,
    attrs: BTreeMap<String, AttrValue>,
}

impl Element {
    pub fn new(tag: impl Into<Cow<'static, str>>) -> Self {
        Self {
            tag: tag.into(),
            children: Vec::new(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn child(mut self, child: impl Into<Child>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I, C>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Child>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }

    /// Set an attribute. Setting the same name twice keeps the last value.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn attrs<I, N, V>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<AttrValue>,
    {
        for (name, value) in attrs {
            self.attrs.insert(name.into(), value.into());
        }
        self
    }

    /// Assemble the element, claiming addresses for bare fragments.
    pub fn build(self) -> Markup {
        assemble(&self.tag, Some(self.children), self.attrs)
    }
}

/// An element that cannot have children, such as `img` or `br`.
#[derive(Debug, Clone)]
pub struct VoidElement {
    tag: Cow<'static, str>,
    attrs: BTreeMap<String, AttrValue>,
}

impl VoidElement {
    pub fn new(tag: impl Into<Cow<'static, str>>) -> Self {
        Self {
            tag: tag.into(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> Markup {
        assemble(&self.tag, None, self.attrs)
    }
}

/// Hands out addresses under one lazily generated key.
#[derive(Default)]
struct Claims {
    key: Option<Key>,
    owned: usize,
}

impl Claims {
    fn claim(&mut self, fragment: &Fragment, index: Index) {
        if fragment.is_addressed() {
            return;
        }
        let key = self.key.get_or_insert_with(Key::generate).clone();
        if fragment.claim(Address { key, index }) {
            self.owned += 1;
        }
    }

    fn owned_key(&self) -> Option<&Key> {
        if self.owned > 0 {
            self.key.as_ref()
        } else {
            None
        }
    }
}

fn assemble(
    tag: &str,
    children: Option<Vec<Child>>,
    attrs: BTreeMap<String, AttrValue>,
) -> Markup {
    let mut claims = Claims::default();

    // Children first, so the opening tag knows whether to carry a key.
    let mut body = Markup::new();
    match children {
        Some(children) => {
            body.push_str(">");
            for (position, child) in children.into_iter().enumerate() {
                match child {
                    Child::Text(text) => body.push_str(&text),
                    Child::Fragment(fragment) => {
                        claims.claim(&fragment, Index::Position(position));
                        body.push_fragment(fragment);
                    }
                    Child::Markup(markup) => body.append(markup),
                }
            }
            body.push_str(&format!("</{}>", tag));
        }
        None => body.push_str("/>"),
    }

    let mut open = Markup::from(format!("<{}", tag));
    for (name, value) in attrs {
        match value {
            AttrValue::Text(text) => {
                open.push_str(&format!(" {}=\"{}\"", name, escape_attr(&text)));
            }
            AttrValue::Flag(true) => open.push_str(&format!(" {}", name)),
            AttrValue::Flag(false) => {}
            AttrValue::Fragment(fragment) => {
                open.push_str(&format!(" {}=\"", name));
                claims.claim(&fragment, Index::Attribute(name));
                open.push_fragment(fragment);
                open.push_str("\"");
            }
        }
    }
    if let Some(key) = claims.owned_key() {
        open.push_str(&format!(" key=\"{}\"", key));
    }

    open.append(body);
    open
}
