//! String-table compaction for [`ProtoData`] payloads.
//!
//! A payload is a one-byte encoding tag followed by a bincode body holding a
//! deduplicated string table and an index-referencing record. Two encodings
//! exist, mirroring the two in-memory name representations:
//!
//! - `Flat`: every string, including qualified supertype names, is an entry
//!   of the string table.
//! - `Qualified`: supertypes reference a table of `(parent, segment)` pairs,
//!   so packages shared between names are stored once.
//!
//! The writer picks the encoding from [`ProtoData::name_table`]; the reader
//! dispatches on the class/package-part flag and then on the payload's own
//! tag.

use std::collections::HashMap;

use delta_common::{
    ClassKind, ClassProtoData, DeclarationId, Member, MemberKind, NameTableKind,
    PackagePartProtoData, ProtoData, Visibility,
};
use lasso::{Key, Rodeo};
use serde::{Deserialize, Serialize};

use crate::envelope::{decode, encode};
use crate::error::CacheError;

const TAG_FLAT: u8 = 0;
const TAG_QUALIFIED: u8 = 1;

/// Qualified-name index standing for the root package.
const ROOT_NAME: u32 = u32::MAX;

#[derive(Debug, Serialize, Deserialize)]
struct QualifiedName {
    parent: Option<u32>,
    short_name: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Payload<B> {
    strings: Vec<String>,
    qualified_names: Vec<QualifiedName>,
    body: B,
}

#[derive(Debug, Serialize, Deserialize)]
struct EncodedMember {
    name: u32,
    kind: MemberKind,
    signature: u32,
    visibility: Visibility,
}

#[derive(Debug, Serialize, Deserialize)]
struct EncodedClass {
    visibility: Visibility,
    kind: ClassKind,
    flags: u32,
    supertypes: Vec<u32>,
    type_parameters: Vec<u32>,
    members: Vec<EncodedMember>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EncodedPackagePart {
    members: Vec<EncodedMember>,
}

struct TableBuilder {
    kind: NameTableKind,
    strings: Rodeo,
    qualified: Vec<QualifiedName>,
    qualified_index: HashMap<(Option<u32>, u32), u32>,
}

impl TableBuilder {
    fn new(kind: NameTableKind) -> Self {
        Self {
            kind,
            strings: Rodeo::default(),
            qualified: Vec::new(),
            qualified_index: HashMap::new(),
        }
    }

    fn string(&mut self, s: &str) -> u32 {
        self.strings.get_or_intern(s).into_usize() as u32
    }

    fn name(&mut self, id: &DeclarationId) -> u32 {
        match self.kind {
            NameTableKind::Flat => self.string(id.as_str()),
            NameTableKind::Qualified => {
                let mut current: Option<u32> = None;
                for segment in id.segments() {
                    let short_name = self.string(segment);
                    let key = (current, short_name);
                    let next = match self.qualified_index.get(&key) {
                        Some(&idx) => idx,
                        None => {
                            let idx = self.qualified.len() as u32;
                            self.qualified.push(QualifiedName {
                                parent: current,
                                short_name,
                            });
                            self.qualified_index.insert(key, idx);
                            idx
                        }
                    };
                    current = Some(next);
                }
                current.unwrap_or(ROOT_NAME)
            }
        }
    }

    fn member(&mut self, member: &Member) -> EncodedMember {
        EncodedMember {
            name: self.string(&member.name),
            kind: member.kind,
            signature: self.string(&member.signature),
            visibility: member.visibility,
        }
    }

    fn finish<B>(self, body: B) -> Payload<B> {
        let mut entries: Vec<(usize, &str)> = self
            .strings
            .iter()
            .map(|(key, s)| (key.into_usize(), s))
            .collect();
        entries.sort_by_key(|(idx, _)| *idx);
        Payload {
            strings: entries.into_iter().map(|(_, s)| s.to_string()).collect(),
            qualified_names: self.qualified,
            body,
        }
    }
}

struct TableReader<'a, B> {
    kind: NameTableKind,
    payload: &'a Payload<B>,
}

impl<B> TableReader<'_, B> {
    fn string(&self, idx: u32) -> Result<String, CacheError> {
        self.payload
            .strings
            .get(idx as usize)
            .cloned()
            .ok_or_else(|| corrupt(format!("string index {idx} out of range")))
    }

    fn name(&self, idx: u32) -> Result<DeclarationId, CacheError> {
        match self.kind {
            NameTableKind::Flat => Ok(DeclarationId::new(self.string(idx)?)),
            NameTableKind::Qualified => {
                if idx == ROOT_NAME {
                    return Ok(DeclarationId::root());
                }
                let table = &self.payload.qualified_names;
                let mut segments = Vec::new();
                let mut current = Some(idx);
                while let Some(i) = current {
                    // A well-formed chain is never longer than the table.
                    if segments.len() > table.len() {
                        return Err(corrupt("cyclic qualified name".to_string()));
                    }
                    let entry = table
                        .get(i as usize)
                        .ok_or_else(|| corrupt(format!("qualified name {i} out of range")))?;
                    segments.push(self.string(entry.short_name)?);
                    current = entry.parent;
                }
                segments.reverse();
                Ok(DeclarationId::new(segments.join(".")))
            }
        }
    }

    fn member(&self, member: &EncodedMember) -> Result<Member, CacheError> {
        Ok(Member {
            name: self.string(member.name)?,
            kind: member.kind,
            signature: self.string(member.signature)?,
            visibility: member.visibility,
        })
    }
}

fn corrupt(reason: String) -> CacheError {
    CacheError::Serialization { reason }
}

fn tag_of(kind: NameTableKind) -> u8 {
    match kind {
        NameTableKind::Flat => TAG_FLAT,
        NameTableKind::Qualified => TAG_QUALIFIED,
    }
}

fn kind_of(tag: u8) -> Result<NameTableKind, CacheError> {
    match tag {
        TAG_FLAT => Ok(NameTableKind::Flat),
        TAG_QUALIFIED => Ok(NameTableKind::Qualified),
        other => Err(corrupt(format!("unknown payload encoding {other}"))),
    }
}

fn with_tag(tag: u8, body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(tag);
    out.extend_from_slice(&body);
    out
}

/// Encodes and decodes proto payloads by variant flag.
pub struct ProtoCodec;

impl ProtoCodec {
    /// Encodes a descriptor with the encoding matching its name table.
    pub fn encode(proto: &ProtoData) -> Result<Vec<u8>, CacheError> {
        let kind = proto.name_table();
        let mut table = TableBuilder::new(kind);
        let body = match proto {
            ProtoData::Class(class) => {
                let encoded = EncodedClass {
                    visibility: class.visibility,
                    kind: class.kind,
                    flags: class.flags,
                    supertypes: class.supertypes.iter().map(|s| table.name(s)).collect(),
                    type_parameters: class
                        .type_parameters
                        .iter()
                        .map(|t| table.string(t))
                        .collect(),
                    members: class.members.iter().map(|m| table.member(m)).collect(),
                };
                encode(&table.finish(encoded))?
            }
            ProtoData::PackagePart(part) => {
                let encoded = EncodedPackagePart {
                    members: part.members.iter().map(|m| table.member(m)).collect(),
                };
                encode(&table.finish(encoded))?
            }
        };
        Ok(with_tag(tag_of(kind), body))
    }

    /// Decodes a payload written for the variant identified by `flag`.
    pub fn decode(flag: u8, bytes: &[u8]) -> Result<ProtoData, CacheError> {
        let (&tag, body) = bytes
            .split_first()
            .ok_or_else(|| corrupt("empty proto payload".to_string()))?;
        let kind = kind_of(tag)?;
        match flag {
            0 => {
                let payload: Payload<EncodedClass> = decode(body)?;
                let reader = TableReader {
                    kind,
                    payload: &payload,
                };
                let class = &payload.body;
                Ok(ProtoData::Class(ClassProtoData {
                    name_table: kind,
                    visibility: class.visibility,
                    kind: class.kind,
                    flags: class.flags,
                    supertypes: class
                        .supertypes
                        .iter()
                        .map(|&i| reader.name(i))
                        .collect::<Result<_, _>>()?,
                    type_parameters: class
                        .type_parameters
                        .iter()
                        .map(|&i| reader.string(i))
                        .collect::<Result<_, _>>()?,
                    members: class
                        .members
                        .iter()
                        .map(|m| reader.member(m))
                        .collect::<Result<_, _>>()?,
                }))
            }
            1 => {
                let payload: Payload<EncodedPackagePart> = decode(body)?;
                let reader = TableReader {
                    kind,
                    payload: &payload,
                };
                Ok(ProtoData::PackagePart(PackagePartProtoData {
                    name_table: kind,
                    members: payload
                        .body
                        .members
                        .iter()
                        .map(|m| reader.member(m))
                        .collect::<Result<_, _>>()?,
                }))
            }
            other => Err(corrupt(format!("unknown proto variant flag {other}"))),
        }
    }
}
