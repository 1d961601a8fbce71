//! Tag constructors.
//!
//! One function per HTML element, returning an [`Element`] or, for elements
//! that cannot have children, a [`VoidElement`].

use super::element::{Element, VoidElement};

macro_rules! container_tags {
    ($($name:ident => $tag:literal),* $(,)?) => {
        $(
            #[doc = concat!("`<", $tag, ">` element.")]
            pub fn $name() -> Element {
                Element::new($tag)
            }
        )*
    };
}

macro_rules! void_tags {
    ($($name:ident => $tag:literal),* $(,)?) => {
        $(
            #[doc = concat!("`<", $tag, "/>` element.")]
            pub fn $name() -> VoidElement {
                VoidElement::new($tag)
            }
        )*
    };
}

container_tags! {
    // Document
    html => "html",
    head => "head",
    body => "body",
    title => "title",
    script => "script",
    style => "style",

    // Content sectioning
    address => "address",
    article => "article",
    aside => "aside",
    footer => "footer",
    h1 => "h1",
    h2 => "h2",
    h3 => "h3",
    h4 => "h4",
    h5 => "h5",
    h6 => "h6",
    header => "header",
    nav => "nav",
    section => "section",

    // Text content
    blockquote => "blockquote",
    dd => "dd",
    div => "div",
    dl => "dl",
    dt => "dt",
    figcaption => "figcaption",
    figure => "figure",
    li => "li",
    ol => "ol",
    p => "p",
    pre => "pre",
    ul => "ul",

    // Inline text semantics
    a => "a",
    b => "b",
    code => "code",
    em => "em",
    i => "i",
    small => "small",
    span => "span",
    strong => "strong",
    sub => "sub",
    sup => "sup",
    time => "time",

    // Media
    audio => "audio",
    video => "video",

    // Tables
    caption => "caption",
    table => "table",
    tbody => "tbody",
    td => "td",
    tfoot => "tfoot",
    th => "th",
    thead => "thead",
    tr => "tr",

    // Forms and interactive elements
    button => "button",
    label => "label",
    meter => "meter",
    output => "output",
    progress => "progress",
    details => "details",
    dialog => "dialog",
    summary => "summary",
}

void_tags! {
    br => "br",
    hr => "hr",
    img => "img",
    input => "input",
    meta => "meta",
    link => "link",
    source => "source",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_render_their_names() {
        assert_eq!(span().child("x").build().to_html(), "<span>x</span>");
        assert_eq!(br().build().to_html(), "<br/>");
        assert_eq!(
            input().attr("disabled", true).build().to_html(),
            "<input disabled/>"
        );
    }
}
