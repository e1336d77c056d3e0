//! Annotation-task XML files.
//!
//! Input: a `<documents>` root of `<document id="...">` elements; each
//! document holds `<sentence>` elements; each sentence holds `<word v="..."/>`
//! elements whose `v` attribute is a space-separated embedding row.
//!
//! Output: a `<documents>` root of empty `<document>` elements carrying `id`,
//! `polarity` and (for scored documents) a 4-decimal `score` attribute.

use std::io::Cursor;
use std::path::Path;

use anyhow::Context;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

// ── Records ─────────────────────────────────────────────────────────────────

/// One document from a task-input file: an id plus pre-embedded sentences.
///
/// Each sentence is a flat `n_words * embed_dim` buffer, the same layout the
/// dataset archives use.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationDoc {
    pub id: String,
    pub sentences: Vec<Vec<f32>>,
}

impl AnnotationDoc {
    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

/// The model's verdict on one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub id: String,
    /// Sigmoid score; `None` for documents with no sentences.
    pub score: Option<f32>,
}

impl Prediction {
    /// Polarity string for the output file. A score of exactly 0.5 counts
    /// as positive, matching the training-accuracy threshold.
    pub fn polarity(&self) -> &'static str {
        match self.score {
            Some(s) if s >= 0.5 => "positive",
            Some(_) => "negative",
            None => "unknown",
        }
    }
}

// ── Reading ─────────────────────────────────────────────────────────────────

/// Read a task-input file. Every word vector must have `embed_dim` values.
pub fn read_task_input(path: &Path, embed_dim: usize) -> anyhow::Result<Vec<AnnotationDoc>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read task input {}", path.display()))?;
    parse_task_input(&content, embed_dim)
        .with_context(|| format!("parse task input {}", path.display()))
}

fn parse_task_input(content: &str, embed_dim: usize) -> anyhow::Result<Vec<AnnotationDoc>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut docs = Vec::new();
    let mut current: Option<AnnotationDoc> = None;
    let mut in_sentence = false;
    let mut words: Vec<f32> = Vec::new();

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"document" => {
                    current = Some(AnnotationDoc {
                        id: attr_id(e)?,
                        sentences: Vec::new(),
                    });
                }
                b"sentence" => {
                    in_sentence = true;
                    words.clear();
                }
                b"word" => {
                    if in_sentence {
                        words.extend(parse_word_element(e, embed_dim)?);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                // A self-closing document has no sentences.
                b"document" => docs.push(AnnotationDoc {
                    id: attr_id(e)?,
                    sentences: Vec::new(),
                }),
                b"sentence" => anyhow::bail!("sentence with no words"),
                b"word" => {
                    if in_sentence {
                        words.extend(parse_word_element(e, embed_dim)?);
                    }
                }
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"document" => {
                    if let Some(doc) = current.take() {
                        docs.push(doc);
                    }
                }
                b"sentence" => {
                    in_sentence = false;
                    if words.is_empty() {
                        anyhow::bail!("sentence with no words");
                    }
                    if let Some(doc) = current.as_mut() {
                        doc.sentences.push(std::mem::take(&mut words));
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => anyhow::bail!("XML parse error: {e}"),
            _ => {}
        }
        buf.clear();
    }

    Ok(docs)
}

fn attr_id(e: &BytesStart<'_>) -> anyhow::Result<String> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == b"id" {
            let id = std::str::from_utf8(&attr.value).context("invalid UTF-8 in id")?;
            return Ok(id.to_string());
        }
    }
    anyhow::bail!("document element missing id attribute");
}

/// Parse one `<word v="f32 f32 ..."/>` element into an embedding row.
fn parse_word_element(e: &BytesStart<'_>, embed_dim: usize) -> anyhow::Result<Vec<f32>> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == b"v" {
            let text =
                std::str::from_utf8(&attr.value).context("invalid UTF-8 in word vector")?;
            let values = text
                .split_whitespace()
                .map(str::parse::<f32>)
                .collect::<Result<Vec<f32>, _>>()
                .context("invalid value in word vector")?;
            if values.len() != embed_dim {
                anyhow::bail!(
                    "word vector has {} values, expected {embed_dim}",
                    values.len()
                );
            }
            return Ok(values);
        }
    }
    anyhow::bail!("word element missing v attribute");
}

// ── Writing ─────────────────────────────────────────────────────────────────

/// Write a task-output file.
pub fn write_task_output(path: &Path, predictions: &[Prediction]) -> anyhow::Result<()> {
    let mut buffer = Vec::new();
    let mut writer = Writer::new_with_indent(Cursor::new(&mut buffer), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new("documents")))?;
    for p in predictions {
        let mut doc = BytesStart::new("document");
        doc.push_attribute(("id", p.id.as_str()));
        doc.push_attribute(("polarity", p.polarity()));
        if let Some(score) = p.score {
            doc.push_attribute(("score", format!("{score:.4}").as_str()));
        }
        writer.write_event(Event::Empty(doc))?;
    }
    writer.write_event(Event::End(BytesEnd::new("documents")))?;

    std::fs::write(path, &buffer)
        .with_context(|| format!("write task output {}", path.display()))?;
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<documents>
  <document id="d1">
    <sentence>
      <word v="0.5 -1.0"/>
      <word v="2.0 0.25"/>
    </sentence>
    <sentence>
      <word v="1.0 1.0"/>
    </sentence>
  </document>
  <document id="d2"/>
  <document id="d3"></document>
</documents>"#;

    #[test]
    fn parses_documents_sentences_and_words() {
        let docs = parse_task_input(SAMPLE, 2).unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].id, "d1");
        assert_eq!(docs[0].sentences.len(), 2);
        assert_eq!(docs[0].sentences[0], vec![0.5, -1.0, 2.0, 0.25]);
        assert_eq!(docs[0].sentences[1], vec![1.0, 1.0]);
        assert!(docs[1].is_empty());
        assert_eq!(docs[2].id, "d3");
        assert!(docs[2].is_empty());
    }

    #[test]
    fn rejects_wrong_width_word_vectors() {
        let err = parse_task_input(SAMPLE, 3).unwrap_err();
        assert!(err.to_string().contains("expected 3"));
    }

    #[test]
    fn rejects_sentences_without_words() {
        let xml = r#"<documents><document id="d1"><sentence/></document></documents>"#;
        assert!(parse_task_input(xml, 2).is_err());
        let xml = r#"<documents><document id="d1"><sentence></sentence></document></documents>"#;
        assert!(parse_task_input(xml, 2).is_err());
    }

    #[test]
    fn rejects_documents_without_id() {
        let xml = r#"<documents><document/></documents>"#;
        assert!(parse_task_input(xml, 2).is_err());
    }

    #[test]
    fn polarity_threshold_ties_go_positive() {
        let p = |score| Prediction {
            id: "x".to_string(),
            score,
        };
        assert_eq!(p(Some(0.5)).polarity(), "positive");
        assert_eq!(p(Some(0.4999)).polarity(), "negative");
        assert_eq!(p(None).polarity(), "unknown");
    }

    #[test]
    fn output_carries_polarity_and_four_decimal_score() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xml");
        let predictions = vec![
            Prediction {
                id: "d1".to_string(),
                score: Some(0.81234),
            },
            Prediction {
                id: "d2".to_string(),
                score: None,
            },
        ];
        write_task_output(&path, &predictions).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(text.contains(r#"<document id="d1" polarity="positive" score="0.8123"/>"#));
        assert!(text.contains(r#"<document id="d2" polarity="unknown"/>"#));
    }
}
