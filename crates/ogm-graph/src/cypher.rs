//! Cypher text building blocks shared by every compiled template.
//!
//! Templates use positional parameters written `{0}`, `{1}`, ... Entity key
//! values always come first, in key column order.

/// Label carried by every entity node.
pub const ENTITY: &str = "ENTITY";
/// Label carried by embedded value nodes and embedded collection elements.
pub const EMBEDDED: &str = "EMBEDDED";
/// Label of sequence nodes used for id generation.
pub const SEQUENCE: &str = "SEQUENCE";

/// Property holding a sequence node's name.
pub const SEQUENCE_NAME: &str = "sequence_name";
/// Property holding a sequence node's last returned value.
pub const SEQUENCE_VALUE: &str = "current_value";

/// Quotes an identifier with backticks unless it is a plain word.
pub fn escape_identifier(identifier: &str) -> String {
    let mut chars = identifier.chars();
    let plain = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if plain {
        identifier.to_string()
    } else {
        format!("`{}`", identifier.replace('`', "``"))
    }
}

/// Positional parameter placeholder.
pub fn param(position: usize) -> String {
    format!("{{{}}}", position)
}

/// `alias.property`, escaping the property.
pub fn property(alias: &str, name: &str) -> String {
    format!("{}.{}", alias, escape_identifier(name))
}

/// `{a: {0}, b: {1}}` for `properties`, numbering from `first_param`.
pub fn property_map(properties: &[String], first_param: usize) -> String {
    let entries: Vec<String> = properties
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}: {}", escape_identifier(p), param(first_param + i)))
        .collect();
    format!("{{{}}}", entries.join(", "))
}

/// `(alias:L1:L2 {k: {n}, ...})`; the map is omitted when `properties` is empty.
pub fn node(alias: &str, labels: &[&str], properties: &[String], first_param: usize) -> String {
    let mut out = String::from("(");
    out.push_str(alias);
    for label in labels {
        out.push(':');
        out.push_str(&escape_identifier(label));
    }
    if !properties.is_empty() {
        out.push(' ');
        out.push_str(&property_map(properties, first_param));
    }
    out.push(')');
    out
}

/// An entity node of `table` matched by its key columns.
pub fn entity_node(alias: &str, table: &str, key_columns: &[String], first_param: usize) -> String {
    node(alias, &[ENTITY, table], key_columns, first_param)
}

/// `-[alias:TYPE {..}]->`, or `<-[...]-` when `incoming`.
pub fn relationship(
    alias: &str,
    rel_type: &str,
    properties: &[String],
    first_param: usize,
    incoming: bool,
) -> String {
    let mut body = format!("{}:{}", alias, escape_identifier(rel_type));
    if !properties.is_empty() {
        body.push(' ');
        body.push_str(&property_map(properties, first_param));
    }
    if incoming {
        format!("<-[{}]-", body)
    } else {
        format!("-[{}]->", body)
    }
}
