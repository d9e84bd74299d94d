//! Inline-tag markup for annotated text
//!
//! Documents can be written as plain text with entity mentions wrapped in
//! XML-style tags and relations recorded as self-closing tags:
//!
//! ```text
//! <drug id="1">Erlotinib</drug> is approved for <cancer id="2">NSCLC</cancer>
//! <relation type="treats" subj="1" obj="2" />
//! ```
//!
//! The tag name is the entity type. Repeating an `id` in a later tag pair
//! extends the same entity with another non-contiguous span. Character spans
//! refer to the text with all markup stripped.

use crate::{Document, Entity, EntityId, Relation, RelexError, Result, Span};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_][A-Za-z0-9_-]*)\s*=\s*"([^"]*)""#).expect("valid attribute regex")
});

/// Parse inline-tag markup into a document
pub fn parse_tagged(markup: &str) -> Result<Document> {
    let mut text = String::new();
    let mut entities: Vec<Entity> = Vec::new();
    let mut by_source_id: HashMap<String, usize> = HashMap::new();
    let mut open: Option<OpenTag> = None;
    let mut pending_relations: Vec<(String, String, String)> = Vec::new();
    let mut next_id: EntityId = 1;

    let mut rest = markup;
    while let Some(lt) = rest.find('<') {
        push_text(&mut text, &rest[..lt]);

        let after_lt = &rest[lt + 1..];
        let gt = after_lt
            .find('>')
            .ok_or_else(|| RelexError::Markup("Unclosed tag".to_string()))?;
        let body = &after_lt[..gt];
        rest = &after_lt[gt + 1..];

        if let Some(name) = body.strip_prefix('/') {
            // Closing tag
            let name = name.trim();
            let tag = open.take().ok_or_else(|| {
                RelexError::Markup(format!("Closing tag </{name}> without an opening tag"))
            })?;
            if tag.name != name {
                return Err(RelexError::Markup(format!(
                    "Mismatched closing tag </{}> for <{}>",
                    name, tag.name
                )));
            }
            let span = Span::new(tag.start, text.len());
            let covered = text[span.start..span.end].to_string();
            close_entity(
                &mut entities,
                &mut by_source_id,
                &mut next_id,
                tag,
                span,
                covered,
            )?;
        } else if let Some(inner) = body.strip_suffix('/') {
            // Self-closing tag
            let (name, attrs) = parse_tag_body(inner);
            if name != "relation" {
                return Err(RelexError::Markup(format!(
                    "Self-closing <{name} /> is only valid for relation tags"
                )));
            }
            let relation_type = require_attr(&attrs, "type", "relation")?;
            let subj = require_attr(&attrs, "subj", "relation")?;
            let obj = require_attr(&attrs, "obj", "relation")?;
            pending_relations.push((relation_type, subj, obj));
        } else {
            // Opening tag
            let (name, attrs) = parse_tag_body(body);
            if name.is_empty() {
                return Err(RelexError::Markup("Tag with empty name".to_string()));
            }
            if let Some(outer) = &open {
                return Err(RelexError::Markup(format!(
                    "Nested entity tag <{name}> inside <{}>",
                    outer.name
                )));
            }
            open = Some(OpenTag {
                name: name.to_string(),
                source_id: attrs.get("id").cloned(),
                start: text.len(),
            });
        }
    }
    push_text(&mut text, rest);

    if let Some(tag) = open {
        return Err(RelexError::Markup(format!(
            "Unclosed entity tag <{}>",
            tag.name
        )));
    }

    let mut relations = Vec::with_capacity(pending_relations.len());
    for (relation_type, subj, obj) in pending_relations {
        let subject = resolve(&by_source_id, &entities, &subj)?;
        let object = resolve(&by_source_id, &entities, &obj)?;
        relations.push(Relation::new(relation_type, subject, object));
    }

    // Trailing whitespace left behind by stripped relation tags
    let trimmed = text.trim_end();
    if trimmed.len() < text.len() {
        text.truncate(trimmed.len());
    }

    Ok(Document {
        text,
        entities,
        relations,
    })
}

/// Render a document back to inline-tag markup
///
/// Fails if any two entity spans overlap, since overlapping mentions cannot
/// be expressed with inline tags.
pub fn render_tagged(document: &Document) -> Result<String> {
    let mut tagged_spans: Vec<(Span, usize)> = Vec::new();
    for (index, entity) in document.entities.iter().enumerate() {
        for span in &entity.spans {
            tagged_spans.push((*span, index));
        }
    }
    tagged_spans.sort_by_key(|(span, _)| (span.start, span.end));

    for pair in tagged_spans.windows(2) {
        if pair[0].0.overlaps(&pair[1].0) {
            return Err(RelexError::Markup(
                "Overlapping entity spans cannot be rendered as inline tags".to_string(),
            ));
        }
    }

    let mut out = String::new();
    let mut cursor = 0usize;
    for (span, index) in tagged_spans {
        let entity = &document.entities[index];
        escape_into(&mut out, &document.text[cursor..span.start]);
        out.push('<');
        out.push_str(&entity.entity_type);
        out.push_str(" id=\"");
        out.push_str(&render_id(entity));
        out.push_str("\">");
        escape_into(&mut out, &document.text[span.start..span.end]);
        out.push_str("</");
        out.push_str(&entity.entity_type);
        out.push('>');
        cursor = span.end;
    }
    escape_into(&mut out, &document.text[cursor..]);

    for relation in &document.relations {
        let subject = document
            .entity(relation.subject)
            .ok_or_else(|| missing_endpoint(relation.subject))?;
        let object = document
            .entity(relation.object)
            .ok_or_else(|| missing_endpoint(relation.object))?;
        out.push_str(&format!(
            "\n<relation type=\"{}\" subj=\"{}\" obj=\"{}\" />",
            relation.relation_type,
            render_id(subject),
            render_id(object)
        ));
    }

    Ok(out)
}

struct OpenTag {
    name: String,
    source_id: Option<String>,
    start: usize,
}

fn close_entity(
    entities: &mut Vec<Entity>,
    by_source_id: &mut HashMap<String, usize>,
    next_id: &mut EntityId,
    tag: OpenTag,
    span: Span,
    covered: String,
) -> Result<()> {
    if let Some(source_id) = &tag.source_id {
        if let Some(&index) = by_source_id.get(source_id) {
            // Another span of an already-seen entity
            let entity = &mut entities[index];
            if entity.entity_type != tag.name {
                return Err(RelexError::Markup(format!(
                    "Entity id \"{source_id}\" reused with type <{}> after <{}>",
                    tag.name, entity.entity_type
                )));
            }
            entity.text.push(' ');
            entity.text.push_str(&covered);
            entity.spans.push(span);
            return Ok(());
        }
    }

    let id = *next_id;
    *next_id += 1;
    let mut entity = Entity::new(id, tag.name, covered, span);
    if let Some(source_id) = tag.source_id {
        by_source_id.insert(source_id.clone(), entities.len());
        entity = entity.with_source_id(source_id);
    }
    entities.push(entity);
    Ok(())
}

fn parse_tag_body(body: &str) -> (&str, HashMap<String, String>) {
    let body = body.trim();
    let name_end = body
        .find(|c: char| c.is_whitespace())
        .unwrap_or(body.len());
    let name = &body[..name_end];

    let mut attrs = HashMap::new();
    for capture in ATTR_RE.captures_iter(&body[name_end..]) {
        attrs.insert(capture[1].to_string(), capture[2].to_string());
    }
    (name, attrs)
}

fn require_attr(attrs: &HashMap<String, String>, key: &str, tag: &str) -> Result<String> {
    attrs
        .get(key)
        .cloned()
        .ok_or_else(|| RelexError::Markup(format!("<{tag}> tag is missing the \"{key}\" attribute")))
}

fn resolve(
    by_source_id: &HashMap<String, usize>,
    entities: &[Entity],
    source_id: &str,
) -> Result<EntityId> {
    by_source_id
        .get(source_id)
        .map(|&index| entities[index].id)
        .ok_or_else(|| {
            RelexError::Markup(format!(
                "Relation references unknown entity id \"{source_id}\""
            ))
        })
}

fn missing_endpoint(id: EntityId) -> RelexError {
    RelexError::Markup(format!("Relation references unknown entity id \"{id}\""))
}

fn render_id(entity: &Entity) -> String {
    entity
        .source_id
        .clone()
        .unwrap_or_else(|| entity.id.to_string())
}

/// Append raw text, decoding the XML escapes `&lt;`, `&gt;`, `&amp;`,
/// `&quot;`, and `&apos;`
fn push_text(out: &mut String, raw: &str) {
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = [
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&amp;", '&'),
            ("&quot;", '"'),
            ("&apos;", '\''),
        ]
        .iter()
        .find(|(escape, _)| tail.starts_with(escape));

        match decoded {
            Some((escape, ch)) => {
                out.push(*ch);
                rest = &tail[escape.len()..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
}

fn escape_into(out: &mut String, raw: &str) {
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Symmetry;

    #[test]
    fn test_parse_entities_and_relation() {
        let doc = parse_tagged(
            r#"<drug id="1">Erlotinib</drug> is approved for <cancer id="2">NSCLC</cancer> <relation type="treats" subj="1" obj="2" />"#,
        )
        .unwrap();

        assert_eq!(doc.text, "Erlotinib is approved for NSCLC");
        assert_eq!(doc.entities.len(), 2);

        let drug = &doc.entities[0];
        assert_eq!(drug.entity_type, "drug");
        assert_eq!(&doc.text[drug.spans[0].start..drug.spans[0].end], "Erlotinib");
        assert_eq!(drug.source_id.as_deref(), Some("1"));

        assert_eq!(doc.relations.len(), 1);
        let relation = &doc.relations[0];
        assert_eq!(relation.relation_type, "treats");
        assert_eq!(relation.subject, doc.entities[0].id);
        assert_eq!(relation.object, doc.entities[1].id);
        assert_eq!(relation.symmetry, Symmetry::Directed);
    }

    #[test]
    fn test_parse_multi_span_entity() {
        let doc = parse_tagged(
            r#"<disease id="1">breast</disease> and <disease id="1">ovarian cancer</disease> risk"#,
        )
        .unwrap();

        assert_eq!(doc.entities.len(), 1);
        let entity = &doc.entities[0];
        assert_eq!(entity.spans.len(), 2);
        assert_eq!(entity.text, "breast ovarian cancer");
        assert_eq!(&doc.text[entity.spans[1].start..entity.spans[1].end], "ovarian cancer");
    }

    #[test]
    fn test_parse_decodes_escapes() {
        let doc = parse_tagged(r#"alpha &lt;= beta &amp; <gene id="1">TP53</gene>"#).unwrap();
        assert_eq!(doc.text, "alpha <= beta & TP53");
        let gene = &doc.entities[0];
        assert_eq!(&doc.text[gene.spans[0].start..gene.spans[0].end], "TP53");
    }

    #[test]
    fn test_parse_rejects_unclosed_tag() {
        let err = parse_tagged(r#"<drug id="1">aspirin"#).unwrap_err();
        assert!(matches!(err, RelexError::Markup(_)));
    }

    #[test]
    fn test_parse_rejects_mismatched_close() {
        let err = parse_tagged(r#"<drug id="1">aspirin</disease>"#).unwrap_err();
        assert!(matches!(err, RelexError::Markup(_)));
    }

    #[test]
    fn test_parse_rejects_nested_entities() {
        let err = parse_tagged(r#"<a id="1">x <b id="2">y</b></a>"#).unwrap_err();
        assert!(matches!(err, RelexError::Markup(_)));
    }

    #[test]
    fn test_parse_rejects_unknown_relation_endpoint() {
        let err =
            parse_tagged(r#"<drug id="1">aspirin</drug> <relation type="treats" subj="1" obj="9" />"#)
                .unwrap_err();
        assert!(matches!(err, RelexError::Markup(_)));
    }

    #[test]
    fn test_parse_rejects_missing_relation_attrs() {
        let err = parse_tagged(r#"<drug id="1">x</drug> <relation type="treats" subj="1" />"#)
            .unwrap_err();
        assert!(matches!(err, RelexError::Markup(_)));
    }

    #[test]
    fn test_render_round_trip() {
        let markup = r#"<drug id="1">Erlotinib</drug> is approved for <cancer id="2">NSCLC</cancer>"#;
        let doc = parse_tagged(&format!(
            "{markup} <relation type=\"treats\" subj=\"1\" obj=\"2\" />"
        ))
        .unwrap();

        let rendered = render_tagged(&doc).unwrap();
        let reparsed = parse_tagged(&rendered).unwrap();

        assert_eq!(reparsed.text, doc.text);
        assert_eq!(reparsed.entities, doc.entities);
        assert_eq!(reparsed.relations, doc.relations);
    }

    #[test]
    fn test_render_rejects_overlapping_spans() {
        let doc = Document::new("aspirin").with_entities(vec![
            Entity::new(1, "drug", "aspirin", Span::new(0, 7)),
            Entity::new(2, "compound", "spir", Span::new(1, 5)),
        ]);
        assert!(render_tagged(&doc).is_err());
    }
}
