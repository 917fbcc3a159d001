//! # Marian Tokenizers
//!
//! `opus-mt` repositories ship two SentencePiece models (`source.spm` and
//! `target.spm`) plus one `vocab.json` shared by both sides, not a
//! `tokenizer.json`. Each side becomes a unigram tokenizer whose ids come
//! from `vocab.json`, so encoder input and decoder output line up with the
//! model's embedding rows.
//!
//! ## Multilingual targets:
//! Models that translate into several languages list `>>lang<<` tokens in
//! their vocabulary and expect one of them in front of the source text.
//! Some use two-letter codes (`>>fr<<`), most use ISO 639-3 (`>>fra<<`).

use super::language::LanguageTag;
use prost::Message;
use std::collections::HashMap;
use std::path::Path;
use tokenizers::models::unigram::Unigram;
use tokenizers::normalizers::NFKC;
use tokenizers::pre_tokenizers::metaspace::{Metaspace, PrependScheme};
use tokenizers::{
    DecoderWrapper, ModelWrapper, NormalizerWrapper, PostProcessorWrapper, PreTokenizerWrapper, Tokenizer,
    TokenizerBuilder,
};

/// Score for vocabulary entries the SentencePiece model does not know, so
/// the unigram search only picks them when nothing else fits.
const FOREIGN_PIECE_SCORE: f64 = -100.0;

const UNK_TOKEN: &str = "<unk>";
const PAD_TOKEN: &str = "<pad>";
const EOS_TOKEN: &str = "</s>";

#[derive(Debug, thiserror::Error)]
pub enum TokenizerError {
    #[error("reading {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("vocab.json: {0}")]
    Vocab(#[from] serde_json::Error),

    #[error("sentencepiece model: {0}")]
    SentencePiece(#[from] prost::DecodeError),

    #[error("building tokenizer: {0}")]
    Build(String),
}

/// The subset of SentencePiece's `ModelProto` needed to rebuild the vocabulary.
#[derive(Clone, PartialEq, Message)]
struct SentencePieceModel {
    #[prost(message, repeated, tag = "1")]
    pieces: Vec<SentencePiece>,
}

#[derive(Clone, PartialEq, Message)]
struct SentencePiece {
    #[prost(string, optional, tag = "1")]
    piece: Option<String>,
    #[prost(float, optional, tag = "2")]
    score: Option<f32>,
}

/// Source and target tokenizers for one Marian model.
pub struct MarianTokenizers {
    source: Tokenizer,
    target: Tokenizer,
    language_tokens: HashMap<String, u32>,
    /// Ids dropped from decoder output before detokenizing
    special_ids: Vec<u32>,
}

impl std::fmt::Debug for MarianTokenizers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarianTokenizers")
            .field("language_tokens", &self.language_tokens.len())
            .finish()
    }
}

impl MarianTokenizers {
    /// Build from the files of an `opus-mt` repository.
    pub fn from_files(source_spm: &Path, target_spm: &Path, vocab_json: &Path) -> Result<Self, TokenizerError> {
        let vocab: HashMap<String, u32> = serde_json::from_slice(&read(vocab_json)?)?;

        let source = unigram_tokenizer(&SentencePieceModel::decode(read(source_spm)?.as_slice())?, &vocab)?;
        let target = unigram_tokenizer(&SentencePieceModel::decode(read(target_spm)?.as_slice())?, &vocab)?;

        Ok(Self::with_vocab(source, target, &vocab))
    }

    /// Build from a single converted `tokenizer.json` used for both sides.
    pub fn from_tokenizer_json(path: &Path) -> Result<Self, TokenizerError> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| TokenizerError::Build(e.to_string()))?;
        let vocab = tokenizer.get_vocab(true);
        Ok(Self::with_vocab(tokenizer.clone(), tokenizer, &vocab))
    }

    fn with_vocab(source: Tokenizer, target: Tokenizer, vocab: &HashMap<String, u32>) -> Self {
        let language_tokens = vocab
            .iter()
            .filter(|(token, _)| token.len() > 4 && token.starts_with(">>") && token.ends_with("<<"))
            .map(|(token, &id)| (token.clone(), id))
            .collect();
        let special_ids = [UNK_TOKEN, PAD_TOKEN, EOS_TOKEN]
            .iter()
            .filter_map(|token| vocab.get(*token).copied())
            .collect();

        Self { source, target, language_tokens, special_ids }
    }

    /// Whether the model needs a `>>lang<<` token to pick its output language.
    pub fn is_multilingual_target(&self) -> bool {
        !self.language_tokens.is_empty()
    }

    /// The `>>lang<<` token id selecting `target`, if the model knows it.
    pub fn target_token(&self, target: &LanguageTag) -> Option<u32> {
        let code = target.as_str();
        let primary = code.split('-').next().unwrap_or(code);

        [Some(code), Some(primary), target.alpha3()]
            .into_iter()
            .flatten()
            .find_map(|code| self.language_tokens.get(&format!(">>{}<<", code)).copied())
    }

    /// Source-side ids, without the end-of-sentence token.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
        let encoding = self
            .source
            .encode(text, false)
            .map_err(|e| TokenizerError::Build(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Target-side text for generated ids.
    pub fn decode(&self, ids: &[u32]) -> Result<String, TokenizerError> {
        let ids: Vec<u32> = ids.iter().copied().filter(|id| !self.special_ids.contains(id)).collect();
        let text = self
            .target
            .decode(&ids, true)
            .map_err(|e| TokenizerError::Build(e.to_string()))?;
        Ok(text.trim().to_string())
    }
}

fn read(path: &Path) -> Result<Vec<u8>, TokenizerError> {
    std::fs::read(path).map_err(|source| TokenizerError::Io {
        file: path.display().to_string(),
        source,
    })
}

/// A unigram tokenizer over the full shared vocabulary, scored by one side's
/// SentencePiece model.
fn unigram_tokenizer(model: &SentencePieceModel, vocab: &HashMap<String, u32>) -> Result<Tokenizer, TokenizerError> {
    let size = vocab.values().max().map_or(0, |max| *max as usize + 1);

    // Gaps in the id space still need a unique entry to keep positions aligned.
    let mut scored: Vec<(String, f64)> = (0..size)
        .map(|id| (format!("<unused-{}>", id), FOREIGN_PIECE_SCORE))
        .collect();
    for (token, &id) in vocab {
        scored[id as usize] = (token.clone(), FOREIGN_PIECE_SCORE);
    }
    for piece in &model.pieces {
        if let (Some(text), Some(score)) = (&piece.piece, piece.score) {
            if let Some(&id) = vocab.get(text) {
                scored[id as usize].1 = f64::from(score);
            }
        }
    }

    let unk_id = vocab.get(UNK_TOKEN).map(|id| *id as usize);
    let unigram = Unigram::from(scored, unk_id, false).map_err(|e| TokenizerError::Build(e.to_string()))?;
    let metaspace = Metaspace::new('▁', PrependScheme::Always, true);

    let tokenizer = TokenizerBuilder::<
        ModelWrapper,
        NormalizerWrapper,
        PreTokenizerWrapper,
        PostProcessorWrapper,
        DecoderWrapper,
    >::new()
    .with_model(unigram.into())
    .with_normalizer(Some(NFKC.into()))
    .with_pre_tokenizer(Some(metaspace.clone().into()))
    .with_decoder(Some(metaspace.into()))
    .build()
    .map_err(|e| TokenizerError::Build(e.to_string()))?;

    Ok(tokenizer.into())
}


#[cfg(test)]
mod tests {
    use super::fixtures::write_opus_repo;
    use super::*;

    fn load(dir: &Path) -> MarianTokenizers {
        MarianTokenizers::from_files(&dir.join("source.spm"), &dir.join("target.spm"), &dir.join("vocab.json")).unwrap()
    }

    #[test]
    fn source_side_uses_shared_vocab_ids() {
        let dir = tempfile::tempdir().unwrap();
        write_opus_repo(dir.path(), false);
        let tokenizers = load(dir.path());

        assert_eq!(tokenizers.encode("the dog").unwrap(), vec![2, 3]);
        assert!(!tokenizers.is_multilingual_target());
    }

    #[test]
    fn target_side_detokenizes_and_drops_specials() {
        let dir = tempfile::tempdir().unwrap();
        write_opus_repo(dir.path(), false);
        let tokenizers = load(dir.path());

        assert_eq!(tokenizers.decode(&[10, 4, 5, 0]).unwrap(), "con chó");
    }

    #[test]
    fn target_language_tokens() {
        let dir = tempfile::tempdir().unwrap();
        write_opus_repo(dir.path(), true);
        let tokenizers = load(dir.path());

        assert!(tokenizers.is_multilingual_target());
        assert_eq!(tokenizers.target_token(&LanguageTag::parse("Vietnamese").unwrap()), Some(11));
        assert_eq!(tokenizers.target_token(&LanguageTag::parse("fr").unwrap()), Some(12));
        assert_eq!(tokenizers.target_token(&LanguageTag::parse("ja").unwrap()), None);
    }

    #[test]
    fn corrupt_sentencepiece_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_opus_repo(dir.path(), false);
        std::fs::write(dir.path().join("source.spm"), [0xff, 0xff, 0xff]).unwrap();

        let err = MarianTokenizers::from_files(
            &dir.path().join("source.spm"),
            &dir.path().join("target.spm"),
            &dir.path().join("vocab.json"),
        )
        .unwrap_err();
        assert!(matches!(err, TokenizerError::SentencePiece(_)));
    }
}
