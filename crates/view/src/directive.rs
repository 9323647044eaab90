use woodhouse_dom::Element;

/// The declarative attribute vocabulary. One variant per directive; the
/// scanner matches exhaustively so an unknown `bind-` attribute is inert
/// rather than silently half-handled.
///
/// Modifier attributes (`bind-*-context`, `bind-each-direction`,
/// `bind-array-direction`, `bind-val-events`, `bind-index-offset`) are not
/// directives: they parameterize the directive on the same element and are
/// read by its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Each,
    Array,
    With,
    If,
    Unless,
    Text,
    Html,
    Val,
    Checked,
    Visible,
    Hidden,
    Enabled,
    Disabled,
    Click,
    Submit,
    Attr(String),
}

impl Directive {
    pub fn parse(attr_name: &str) -> Option<Directive> {
        match attr_name {
            "bind-each" => Some(Directive::Each),
            "bind-array" => Some(Directive::Array),
            "bind-with" => Some(Directive::With),
            "bind-if" => Some(Directive::If),
            "bind-unless" => Some(Directive::Unless),
            "bind-text" => Some(Directive::Text),
            "bind-html" => Some(Directive::Html),
            "bind-val" => Some(Directive::Val),
            "bind-checked" => Some(Directive::Checked),
            "bind-visible" => Some(Directive::Visible),
            "bind-hidden" => Some(Directive::Hidden),
            "bind-enabled" => Some(Directive::Enabled),
            "bind-disabled" => Some(Directive::Disabled),
            "bind-click" => Some(Directive::Click),
            "bind-submit" => Some(Directive::Submit),
            other => match other.strip_prefix("bind-attr-") {
                Some("") | Some("context") | None => None,
                Some(target) => Some(Directive::Attr(target.to_string())),
            },
        }
    }
}

/// Whether any attribute on `el` is a binding directive.
pub fn has_directive(el: &Element) -> bool {
    el.attr_names()
        .iter()
        .any(|name| Directive::parse(name).is_some())
}

/// Directives that own their descendants: the scanner leaves everything
/// under them alone until the directive itself activates the subtree.
pub fn owns_descendants(el: &Element) -> bool {
    el.attr("bind-each").is_some()
        || el.attr("bind-if").is_some()
        || el.attr("bind-unless").is_some()
}
