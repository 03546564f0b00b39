//! Save/load (C7): every persisted stream is a [`Header`] followed by the
//! index's own body. Loading re-dispatches on the header's
//! `(index_type, code_type1, code_type2)` triple to pick the matching
//! concrete type's `load_body`, mirroring the nested switch in
//! `examples/original_source/loader.go`.

use std::io::{Read, Write};

use crate::code::CodeTypeTag;
use crate::error::{IndexError, Result};
use crate::flat::FlatIndex;
use crate::index::{AnnIndex, IndexTypeTag};
use crate::ivf::IvfIndex;
use crate::pq::PqIndex;

/// Writes `index.header()` followed by `index.save_body()`.
pub fn save(index: &dyn AnnIndex, mut writer: impl Write) -> Result<()> {
    let header = index.header();
    bincode::serialize_into(&mut writer, &header)?;
    index.save_body(&mut writer)
}

/// Reads a `Header` and dispatches to the matching concrete type's
/// `load_body`, returning it boxed behind [`AnnIndex`].
pub fn load(mut reader: impl Read) -> Result<Box<dyn AnnIndex>> {
    let header: crate::index::Header = bincode::deserialize_from(&mut reader)?;

    match (header.index_type, header.code_type1, header.code_type2) {
        (IndexTypeTag::Flat, CodeTypeTag::None, CodeTypeTag::None) => {
            Ok(Box::new(FlatIndex::load_body(&mut reader)?))
        }

        (IndexTypeTag::Pq, CodeTypeTag::U8, CodeTypeTag::None) => {
            Ok(Box::new(PqIndex::<u8>::load_body(&mut reader)?))
        }
        (IndexTypeTag::Pq, CodeTypeTag::U16, CodeTypeTag::None) => {
            Ok(Box::new(PqIndex::<u16>::load_body(&mut reader)?))
        }
        (IndexTypeTag::Pq, CodeTypeTag::U32, CodeTypeTag::None) => {
            Ok(Box::new(PqIndex::<u32>::load_body(&mut reader)?))
        }

        (IndexTypeTag::Ivf, CodeTypeTag::U8, CodeTypeTag::None) => {
            Ok(Box::new(IvfIndex::<u8, u8>::load_body(&mut reader)?))
        }
        (IndexTypeTag::Ivf, CodeTypeTag::U16, CodeTypeTag::None) => {
            Ok(Box::new(IvfIndex::<u16, u8>::load_body(&mut reader)?))
        }
        (IndexTypeTag::Ivf, CodeTypeTag::U32, CodeTypeTag::None) => {
            Ok(Box::new(IvfIndex::<u32, u8>::load_body(&mut reader)?))
        }

        (IndexTypeTag::Ivf, CodeTypeTag::U8, CodeTypeTag::U8) => {
            Ok(Box::new(IvfIndex::<u8, u8>::load_body(&mut reader)?))
        }
        (IndexTypeTag::Ivf, CodeTypeTag::U8, CodeTypeTag::U16) => {
            Ok(Box::new(IvfIndex::<u8, u16>::load_body(&mut reader)?))
        }
        (IndexTypeTag::Ivf, CodeTypeTag::U8, CodeTypeTag::U32) => {
            Ok(Box::new(IvfIndex::<u8, u32>::load_body(&mut reader)?))
        }
        (IndexTypeTag::Ivf, CodeTypeTag::U16, CodeTypeTag::U8) => {
            Ok(Box::new(IvfIndex::<u16, u8>::load_body(&mut reader)?))
        }
        (IndexTypeTag::Ivf, CodeTypeTag::U16, CodeTypeTag::U16) => {
            Ok(Box::new(IvfIndex::<u16, u16>::load_body(&mut reader)?))
        }
        (IndexTypeTag::Ivf, CodeTypeTag::U16, CodeTypeTag::U32) => {
            Ok(Box::new(IvfIndex::<u16, u32>::load_body(&mut reader)?))
        }
        (IndexTypeTag::Ivf, CodeTypeTag::U32, CodeTypeTag::U8) => {
            Ok(Box::new(IvfIndex::<u32, u8>::load_body(&mut reader)?))
        }
        (IndexTypeTag::Ivf, CodeTypeTag::U32, CodeTypeTag::U16) => {
            Ok(Box::new(IvfIndex::<u32, u16>::load_body(&mut reader)?))
        }
        (IndexTypeTag::Ivf, CodeTypeTag::U32, CodeTypeTag::U32) => {
            Ok(Box::new(IvfIndex::<u32, u32>::load_body(&mut reader)?))
        }

        (index_type, code_type1, code_type2) => Err(IndexError::UnknownTag(format!(
            "{index_type:?}/{code_type1:?}/{code_type2:?}"
        ))),
    }
}
