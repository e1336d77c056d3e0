//! Dataset archives of pre-embedded documents.
//!
//! A document is a list of sentences; a sentence is a row-major
//! `(n_words, embed_dim)` block of f32 word embeddings. Archives are written
//! by `hanet pack` and read fully into memory at training time; ordering is
//! reshuffled per epoch by the trainer, not here.
//!
//! * **[`Document`]** — one labelled example; may have zero sentences.
//! * **[`DocDataset`]** — an archive loaded into memory.
//! * **[`write_archive`]** — serialise documents into the binary format.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{Context, Result as AnyhowResult};
use candle_core::{Device, Result, Tensor};

// ── Archive binary format ───────────────────────────────────────────────────

/// Magic bytes for the document archive format (version 1).
const ARCHIVE_MAGIC: &[u8; 4] = b"HDC1";

/// One labelled document.
///
/// Each sentence is a flat `n_words * embed_dim` buffer; the dataset's
/// `embed_dim` recovers the word count. Zero-sentence documents are legal in
/// an archive and are skipped by the training and test loops.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Binary sentiment label: 0 negative, 1 positive.
    pub label: u8,
    /// Flat word-embedding rows, one buffer per sentence.
    pub sentences: Vec<Vec<f32>>,
}

impl Document {
    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn num_sentences(&self) -> usize {
        self.sentences.len()
    }

    /// Sentence tensors, each `(n_words, embed_dim)`, on the given device.
    pub fn to_tensors(&self, embed_dim: usize, device: &Device) -> Result<Vec<Tensor>> {
        self.sentences
            .iter()
            .map(|s| {
                let n_words = s.len() / embed_dim;
                Tensor::from_vec(s.clone(), (n_words, embed_dim), device)
            })
            .collect()
    }
}

/// Write documents to a binary archive.
///
/// Format (little-endian): magic "HDC1" (4 bytes), `embed_dim` u32,
/// `doc_count` u64, then per document: label u8, `n_sentences` u32, then per
/// sentence: `n_words` u32 followed by `n_words * embed_dim` f32 values.
pub fn write_archive(path: &Path, embed_dim: usize, docs: &[Document]) -> AnyhowResult<()> {
    if embed_dim == 0 {
        anyhow::bail!("embed_dim must be nonzero");
    }
    let file = File::create(path).context("create archive")?;
    let mut w = BufWriter::new(file);
    w.write_all(ARCHIVE_MAGIC)?;
    w.write_all(&(embed_dim as u32).to_le_bytes())?;
    w.write_all(&(docs.len() as u64).to_le_bytes())?;
    for (i, doc) in docs.iter().enumerate() {
        if doc.label > 1 {
            anyhow::bail!("document {i}: label {} is not binary", doc.label);
        }
        w.write_all(&[doc.label])?;
        w.write_all(&(doc.sentences.len() as u32).to_le_bytes())?;
        for (j, sentence) in doc.sentences.iter().enumerate() {
            if sentence.is_empty() || sentence.len() % embed_dim != 0 {
                anyhow::bail!(
                    "document {i} sentence {j}: {} values is not a multiple of embed_dim {}",
                    sentence.len(),
                    embed_dim
                );
            }
            w.write_all(&((sentence.len() / embed_dim) as u32).to_le_bytes())?;
            for &v in sentence {
                w.write_all(&v.to_le_bytes())?;
            }
        }
    }
    w.flush()?;
    w.get_ref().sync_all().context("sync archive")?;
    Ok(())
}

// ── DocDataset (in-memory) ──────────────────────────────────────────────────

/// An archive of labelled documents, loaded fully into memory.
#[derive(Debug)]
pub struct DocDataset {
    embed_dim: usize,
    docs: Vec<Document>,
}

impl DocDataset {
    /// Load an archive, validating magic, labels, and sentence lengths.
    pub fn load(path: &Path) -> AnyhowResult<Self> {
        let file = File::open(path)
            .with_context(|| format!("open archive {}", path.display()))?;
        let mut r = BufReader::new(file);

        let mut magic = [0u8; 4];
        r.read_exact(&mut magic).context("archive too short")?;
        if &magic != ARCHIVE_MAGIC {
            anyhow::bail!("invalid archive: bad magic");
        }
        let embed_dim = read_u32(&mut r)? as usize;
        if embed_dim == 0 {
            anyhow::bail!("invalid archive: zero embed_dim");
        }
        let doc_count = read_u64(&mut r)? as usize;

        let mut docs = Vec::with_capacity(doc_count);
        for i in 0..doc_count {
            let mut label = [0u8; 1];
            r.read_exact(&mut label)
                .with_context(|| format!("archive truncated at document {i}"))?;
            let label = label[0];
            if label > 1 {
                anyhow::bail!("document {i}: label {label} is not binary");
            }
            let n_sentences = read_u32(&mut r)? as usize;
            let mut sentences = Vec::with_capacity(n_sentences);
            for j in 0..n_sentences {
                let n_words = read_u32(&mut r)? as usize;
                if n_words == 0 {
                    anyhow::bail!("document {i} sentence {j}: zero words");
                }
                let mut buf = vec![0u8; n_words * embed_dim * 4];
                r.read_exact(&mut buf)
                    .with_context(|| format!("archive truncated at document {i} sentence {j}"))?;
                let words = buf
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
                    .collect();
                sentences.push(words);
            }
            docs.push(Document { label, sentences });
        }

        Ok(Self { embed_dim, docs })
    }

    pub fn embed_dim(&self) -> usize {
        self.embed_dim
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn get(&self, idx: usize) -> &Document {
        &self.docs[idx]
    }

    pub fn docs(&self) -> &[Document] {
        &self.docs
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn read_u32(r: &mut impl Read) -> AnyhowResult<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b).context("archive truncated")?;
    Ok(u32::from_le_bytes(b))
}

fn read_u64(r: &mut impl Read) -> AnyhowResult<u64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b).context("archive truncated")?;
    Ok(u64::from_le_bytes(b))
}

// ── Tests ───────────────────────────────────────────────────────────────────
