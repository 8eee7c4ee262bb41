//! Fixed table of the attribute tags captured from inbound payloads

/// Identifying attributes the gateway extracts from a stored payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeId {
    PatientName,
    PatientId,
    StudyInstanceUid,
    SeriesInstanceUid,
    SopInstanceUid,
    Modality,
    StudyDate,
    StudyTime,
    AccessionNumber,
}

/// (group, element) pairs for the known tags
pub const KNOWN_TAGS: &[((u16, u16), AttributeId)] = &[
    ((0x0008, 0x0018), AttributeId::SopInstanceUid),
    ((0x0008, 0x0020), AttributeId::StudyDate),
    ((0x0008, 0x0030), AttributeId::StudyTime),
    ((0x0008, 0x0050), AttributeId::AccessionNumber),
    ((0x0008, 0x0060), AttributeId::Modality),
    ((0x0010, 0x0010), AttributeId::PatientName),
    ((0x0010, 0x0020), AttributeId::PatientId),
    ((0x0020, 0x000D), AttributeId::StudyInstanceUid),
    ((0x0020, 0x000E), AttributeId::SeriesInstanceUid),
];

/// Look a tag up in the table; unrecognized tags are skipped by the walker
pub fn lookup(group: u16, element: u16) -> Option<AttributeId> {
    KNOWN_TAGS
        .iter()
        .find(|(tag, _)| *tag == (group, element))
        .map(|(_, id)| *id)
}
