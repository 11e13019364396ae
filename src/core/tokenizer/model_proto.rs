//! Reader for SentencePiece's serialized `ModelProto`.
//!
//! Only the parts needed for encoding are read: the piece table (field 1) and
//! the special token ids in `TrainerSpec` (field 2). Everything else is
//! skipped according to its wire type.

use byteorder::{ByteOrder, LittleEndian};

use super::{TokenId, TokenType, Vocabulary};

const WIRE_VARINT: u64 = 0;
const WIRE_FIXED64: u64 = 1;
const WIRE_LEN: u64 = 2;
const WIRE_FIXED32: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoError(pub String);

impl std::fmt::Display for ProtoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid sentencepiece model: {}", self.0)
    }
}

impl std::error::Error for ProtoError {}

type ProtoResult<T> = std::result::Result<T, ProtoError>;

struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn varint(&mut self) -> ProtoResult<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or_else(|| ProtoError("truncated varint".into()))?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtoError("varint too long".into()))
    }

    fn bytes(&mut self, len: usize) -> ProtoResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| ProtoError("field runs past end of buffer".into()))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn key(&mut self) -> ProtoResult<(u64, u64)> {
        let key = self.varint()?;
        Ok((key >> 3, key & 0x7))
    }

    fn len_delimited(&mut self) -> ProtoResult<&'a [u8]> {
        let len = self.varint()? as usize;
        self.bytes(len)
    }

    fn skip(&mut self, wire_type: u64) -> ProtoResult<()> {
        match wire_type {
            WIRE_VARINT => {
                self.varint()?;
            }
            WIRE_FIXED64 => {
                self.bytes(8)?;
            }
            WIRE_LEN => {
                self.len_delimited()?;
            }
            WIRE_FIXED32 => {
                self.bytes(4)?;
            }
            other => return Err(ProtoError(format!("unsupported wire type {}", other))),
        }
        Ok(())
    }
}

struct Piece {
    text: String,
    score: f32,
    kind: TokenType,
}

fn parse_piece(buf: &[u8]) -> ProtoResult<Piece> {
    let mut reader = WireReader::new(buf);
    let mut piece = Piece {
        text: String::new(),
        score: 0.0,
        kind: TokenType::Normal,
    };
    while !reader.is_empty() {
        match reader.key()? {
            (1, WIRE_LEN) => {
                let raw = reader.len_delimited()?;
                piece.text = String::from_utf8(raw.to_vec())
                    .map_err(|_| ProtoError("piece is not valid UTF-8".into()))?;
            }
            (2, WIRE_FIXED32) => piece.score = LittleEndian::read_f32(reader.bytes(4)?),
            (3, WIRE_VARINT) => piece.kind = TokenType::from_proto(reader.varint()?),
            (_, wire_type) => reader.skip(wire_type)?,
        }
    }
    Ok(piece)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SpecialIds {
    unk: i32,
    bos: i32,
    eos: i32,
    pad: i32,
}

impl Default for SpecialIds {
    fn default() -> Self {
        Self {
            unk: 0,
            bos: 1,
            eos: 2,
            pad: -1,
        }
    }
}

fn parse_trainer_spec(buf: &[u8], ids: &mut SpecialIds) -> ProtoResult<()> {
    let mut reader = WireReader::new(buf);
    while !reader.is_empty() {
        match reader.key()? {
            // int32 fields: negative values arrive sign-extended to 64 bits.
            (40, WIRE_VARINT) => ids.unk = reader.varint()? as i64 as i32,
            (41, WIRE_VARINT) => ids.bos = reader.varint()? as i64 as i32,
            (42, WIRE_VARINT) => ids.eos = reader.varint()? as i64 as i32,
            (43, WIRE_VARINT) => ids.pad = reader.varint()? as i64 as i32,
            (_, wire_type) => reader.skip(wire_type)?,
        }
    }
    Ok(())
}

fn optional_id(id: i32) -> Option<TokenId> {
    u32::try_from(id).ok()
}

/// Parses the bytes of a `tokenizer.model` file into a [`Vocabulary`].
pub fn parse(buf: &[u8]) -> ProtoResult<Vocabulary> {
    let mut reader = WireReader::new(buf);
    let mut pieces = Vec::new();
    let mut ids = SpecialIds::default();

    while !reader.is_empty() {
        match reader.key()? {
            (1, WIRE_LEN) => pieces.push(parse_piece(reader.len_delimited()?)?),
            (2, WIRE_LEN) => parse_trainer_spec(reader.len_delimited()?, &mut ids)?,
            (_, wire_type) => reader.skip(wire_type)?,
        }
    }

    let mut vocab = Vocabulary::new(pieces.iter().map(|p| p.text.clone()).collect());
    vocab.scores = pieces.iter().map(|p| p.score).collect();
    vocab.types = pieces.iter().map(|p| p.kind).collect();
    vocab.unk_token = optional_id(ids.unk);
    vocab.pad_token = optional_id(ids.pad);
    vocab.bos_token = optional_id(ids.bos).unwrap_or(1);
    vocab.eos_token = optional_id(ids.eos).unwrap_or(2);
    Ok(vocab)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn put_varint(out: &mut Vec<u8>, mut value: u64) {
        while value >= 0x80 {
            out.push((value as u8) | 0x80);
            value >>= 7;
        }
        out.push(value as u8);
    }

    fn put_len(out: &mut Vec<u8>, field: u64, payload: &[u8]) {
        put_varint(out, (field << 3) | WIRE_LEN);
        put_varint(out, payload.len() as u64);
        out.extend_from_slice(payload);
    }

    /// Serializes pieces the way `spm_train` does, for fixtures.
    pub(crate) fn encode_model(pieces: &[(&str, f32, u64)], trainer: &[(u64, i64)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (text, score, kind) in pieces {
            let mut piece = Vec::new();
            put_len(&mut piece, 1, text.as_bytes());
            put_varint(&mut piece, (2 << 3) | WIRE_FIXED32);
            piece.extend_from_slice(&score.to_le_bytes());
            put_varint(&mut piece, (3 << 3) | WIRE_VARINT);
            put_varint(&mut piece, *kind);
            put_len(&mut out, 1, &piece);
        }
        let mut spec = Vec::new();
        for (field, value) in trainer {
            put_varint(&mut spec, (field << 3) | WIRE_VARINT);
            put_varint(&mut spec, *value as u64);
        }
        put_len(&mut out, 2, &spec);
        // normalizer_spec, ignored by the reader
        put_len(&mut out, 3, b"\x0a\x04nmt1");
        out
    }

    #[test]
    fn test_parse_pieces_and_special_ids() {
        let bytes = encode_model(
            &[
                ("<unk>", 0.0, 2),
                ("<s>", 0.0, 3),
                ("</s>", 0.0, 3),
                ("<0x0A>", 0.0, 6),
                ("▁hello", -1.5, 1),
            ],
            &[(40, 0), (41, 1), (42, 2), (43, -1)],
        );
        let vocab = parse(&bytes).unwrap();

        assert_eq!(vocab.size(), 5);
        assert_eq!(vocab.token(4), Some("▁hello"));
        assert_eq!(vocab.scores[4], -1.5);
        assert_eq!(vocab.types[1], TokenType::Control);
        assert_eq!(vocab.types[3], TokenType::Byte);
        assert_eq!(vocab.bos_token, 1);
        assert_eq!(vocab.eos_token, 2);
        assert_eq!(vocab.unk_token, Some(0));
        assert_eq!(vocab.pad_token, None);
    }

    #[test]
    fn test_truncated_input() {
        let mut bytes = encode_model(&[("▁a", 0.0, 1)], &[]);
        bytes.truncate(bytes.len() - 3);
        assert!(parse(&bytes).is_err());
    }
}
