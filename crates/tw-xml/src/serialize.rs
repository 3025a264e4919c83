use crate::document::{NodeKind, NodeRecord};

pub(crate) fn write_subtree(records: &[NodeRecord], index: u32, out: &mut String) {
    let record = &records[index as usize];
    match &record.kind {
        NodeKind::Text(value) => escape_into(value, false, out),
        NodeKind::Comment(value) => {
            out.push_str("<!--");
            out.push_str(value);
            out.push_str("-->");
        }
        NodeKind::Element { name, attributes } => {
            out.push('<');
            out.push_str(name);
            for (key, value) in attributes {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                escape_into(value, true, out);
                out.push('"');
            }
            if record.children.is_empty() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for child in &record.children {
                write_subtree(records, *child, out);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
    }
}

fn escape_into(value: &str, attribute: bool, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_quotes_only_inside_attributes() {
        let mut text = String::new();
        escape_into(r#"a "b" <c> & d"#, false, &mut text);
        assert_eq!(text, r#"a "b" &lt;c&gt; &amp; d"#);

        let mut attribute = String::new();
        escape_into(r#"say "hi""#, true, &mut attribute);
        assert_eq!(attribute, "say &quot;hi&quot;");
    }
}
