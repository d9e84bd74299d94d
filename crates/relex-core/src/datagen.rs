//! Deterministic synthetic corpus generation
//!
//! Builds small drug/disease corpora for pipeline smoke tests and examples.
//! Positive documents pair a drug and a disease with a `treats` relation and
//! a treatment-flavored sentence; negative documents mention both entities
//! without relating them. Generation is pure index arithmetic, so the same
//! arguments always produce the same corpus.

use crate::{Document, Entity, Relation, Span};

/// One sentence skeleton: `prefix FIRST middle SECOND suffix`
struct Template {
    prefix: &'static str,
    middle: &'static str,
    suffix: &'static str,
    /// When set, the disease is the first entity in the sentence
    disease_first: bool,
}

const POSITIVE_TEMPLATES: &[Template] = &[
    Template {
        prefix: "",
        middle: " treats ",
        suffix: " .",
        disease_first: false,
    },
    Template {
        prefix: "",
        middle: " is approved to treat ",
        suffix: " .",
        disease_first: false,
    },
    Template {
        prefix: "",
        middle: " reduces the severity of ",
        suffix: " .",
        disease_first: false,
    },
    Template {
        prefix: "Patients receiving ",
        middle: " recovered from ",
        suffix: " quickly .",
        disease_first: false,
    },
    Template {
        prefix: "For ",
        middle: " patients , ",
        suffix: " remains the standard therapy .",
        disease_first: true,
    },
];

const NEGATIVE_TEMPLATES: &[Template] = &[
    Template {
        prefix: "",
        middle: " and ",
        suffix: " appeared in unrelated reports .",
        disease_first: false,
    },
    Template {
        prefix: "",
        middle: " was ineffective against ",
        suffix: " .",
        disease_first: false,
    },
    Template {
        prefix: "",
        middle: " has no association with ",
        suffix: " .",
        disease_first: false,
    },
    Template {
        prefix: "A trial compared ",
        middle: " with placebo in ",
        suffix: " cohorts .",
        disease_first: false,
    },
];

const DRUG_NAMES: &[&str] = &[
    "abexatol",
    "bicarvine",
    "cortrazen",
    "duvelmab",
    "enoxatine",
    "fabrelin",
    "gantrazole",
    "hilozem",
    "ibrexafen",
    "jantovir",
    "kelotristat",
    "lumarodine",
    "mavorixan",
    "nerivatol",
    "olmipressin",
    "pambrocort",
    "quelizumab",
    "rivoglitazone",
    "setrodine",
    "talibrex",
    "ulvestrant",
    "vepatinib",
    "wilfenacin",
    "xanomere",
    "zostivan",
];

const DISEASE_NAMES: &[&str] = &[
    "achrosis",
    "belmar syndrome",
    "cardiopenia",
    "dermatovirosis",
    "enthalgia",
    "fibroplasia",
    "glomerulitis",
    "hepatomalacia",
    "iridomyosis",
    "keratopexy",
    "lymphodermia",
    "myelocarditis",
    "neurasthema",
    "osteolalia",
    "pneumatosis",
    "quartan fever",
    "rhabdovirosis",
    "splenomegaly",
    "thalamitis",
    "uveopathy",
    "vasculomyopathy",
    "xerodermia",
    "yersiniosis",
    "zygomycosis",
];

/// Generate a mixed corpus of `positive` related and `negative` unrelated
/// documents, interleaved
pub fn generate(positive: usize, negative: usize) -> Vec<Document> {
    interleave(positive_documents(positive), negative_documents(negative))
}

/// Generate a corpus and split it in half into (train, test)
///
/// The split alternates within each class, so both halves see every template
/// and keep the same positive/negative balance.
pub fn generate_split(positive: usize, negative: usize) -> (Vec<Document>, Vec<Document>) {
    let (positive_train, positive_test) = halve(positive_documents(positive));
    let (negative_train, negative_test) = halve(negative_documents(negative));
    (
        interleave(positive_train, negative_train),
        interleave(positive_test, negative_test),
    )
}

fn positive_documents(count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| build_document(i, POSITIVE_TEMPLATES, true))
        .collect()
}

fn negative_documents(count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| build_document(i, NEGATIVE_TEMPLATES, false))
        .collect()
}

fn build_document(index: usize, templates: &[Template], related: bool) -> Document {
    // Index arithmetic stands in for sampling: strides coprime to the name
    // pool sizes walk every name, and `index / 2` keeps template coverage
    // identical across the even/odd halves of `generate_split`.
    let template = &templates[(index / 2) % templates.len()];
    let drug = DRUG_NAMES[(index * 3 + 1) % DRUG_NAMES.len()];
    let disease = DISEASE_NAMES[(index * 7 + 2) % DISEASE_NAMES.len()];

    let (first_name, second_name) = if template.disease_first {
        (disease, drug)
    } else {
        (drug, disease)
    };

    let first_start = template.prefix.len();
    let first_end = first_start + first_name.len();
    let second_start = first_end + template.middle.len();
    let second_end = second_start + second_name.len();

    let text = format!(
        "{}{}{}{}{}",
        template.prefix, first_name, template.middle, second_name, template.suffix
    );

    let (drug_span, disease_span) = if template.disease_first {
        (
            Span::new(second_start, second_end),
            Span::new(first_start, first_end),
        )
    } else {
        (
            Span::new(first_start, first_end),
            Span::new(second_start, second_end),
        )
    };

    let mut document = Document::new(text).with_entities(vec![
        Entity::new(1, "drug", drug, drug_span),
        Entity::new(2, "disease", disease, disease_span),
    ]);
    if related {
        document.relations.push(Relation::new("treats", 1, 2));
    }
    document
}

fn halve(documents: Vec<Document>) -> (Vec<Document>, Vec<Document>) {
    let mut first = Vec::with_capacity(documents.len() / 2 + 1);
    let mut second = Vec::with_capacity(documents.len() / 2);
    for (index, document) in documents.into_iter().enumerate() {
        if index % 2 == 0 {
            first.push(document);
        } else {
            second.push(document);
        }
    }
    (first, second)
}

fn interleave(a: Vec<Document>, b: Vec<Document>) -> Vec<Document> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let mut a = a.into_iter();
    let mut b = b.into_iter();
    loop {
        match (a.next(), b.next()) {
            (None, None) => break,
            (x, y) => {
                out.extend(x);
                out.extend(y);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(generate(20, 20), generate(20, 20));
        assert_eq!(generate_split(10, 10), generate_split(10, 10));
    }

    #[test]
    fn test_counts_and_labels() {
        let docs = generate(15, 10);
        assert_eq!(docs.len(), 25);

        let related = docs.iter().filter(|d| !d.relations.is_empty()).count();
        assert_eq!(related, 15);

        for doc in &docs {
            assert_eq!(doc.entities.len(), 2);
            for relation in &doc.relations {
                assert_eq!(relation.relation_type, "treats");
            }
        }
    }

    #[test]
    fn test_entity_spans_cover_names() {
        for doc in generate(25, 25) {
            for entity in &doc.entities {
                let span = entity.spans[0];
                assert_eq!(&doc.text[span.start..span.end], entity.text);
            }
        }
    }

    #[test]
    fn test_relation_endpoints_are_drug_and_disease() {
        for doc in generate(10, 0) {
            let relation = &doc.relations[0];
            assert_eq!(
                doc.entity(relation.subject).map(|e| e.entity_type.as_str()),
                Some("drug")
            );
            assert_eq!(
                doc.entity(relation.object).map(|e| e.entity_type.as_str()),
                Some("disease")
            );
        }
    }

    #[test]
    fn test_split_halves_preserve_balance() {
        let (train, test) = generate_split(100, 100);
        assert_eq!(train.len(), 100);
        assert_eq!(test.len(), 100);

        let train_positive = train.iter().filter(|d| !d.relations.is_empty()).count();
        let test_positive = test.iter().filter(|d| !d.relations.is_empty()).count();
        assert_eq!(train_positive, 50);
        assert_eq!(test_positive, 50);
        assert_ne!(train, test);
    }

    #[test]
    fn test_split_shares_no_document_text() {
        let (train, test) = generate_split(30, 30);
        for test_doc in &test {
            assert!(train.iter().all(|d| d.text != test_doc.text));
        }
    }
}
