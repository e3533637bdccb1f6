//! Group membership and path resolution.
//!
//! Old-style groups keep their members in a symbol table (B-tree + local
//! heap); new-style compact groups keep one link message per member.

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

use crate::btree_v1::collect_symbol_table_nodes;
use crate::error::FormatError;
use crate::link_message::{LinkInfoMessage, LinkMessage, LinkTarget};
use crate::local_heap::LocalHeap;
use crate::message_type::MessageType;
use crate::object_header::ObjectHeader;
use crate::symbol_table::{SymbolTableMessage, SymbolTableNode};

/// A hard-linked group member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    /// Link name of the member.
    pub name: String,
    /// Address of the member's object header.
    pub object_header_address: u64,
}

/// Resolve every member of a symbol-table group.
pub fn read_symbol_table_entries(
    data: &[u8],
    table: &SymbolTableMessage,
    offset_size: u8,
    length_size: u8,
) -> Result<Vec<GroupEntry>, FormatError> {
    let heap = LocalHeap::parse(data, table.heap_address, offset_size, length_size)?;
    let nodes = collect_symbol_table_nodes(data, table.btree_address, offset_size, length_size)?;

    let mut entries = Vec::new();
    for node_address in nodes {
        let node = SymbolTableNode::parse(data, node_address, offset_size)?;
        for entry in &node.entries {
            entries.push(GroupEntry {
                name: heap.read_name(data, entry.link_name_offset)?,
                object_header_address: entry.object_header_address,
            });
        }
    }
    Ok(entries)
}

/// Members of the group described by `header`, or `None` if the object is
/// not a group. Soft, external and user-defined links are not members.
pub fn group_members(
    data: &[u8],
    header: &ObjectHeader,
    offset_size: u8,
    length_size: u8,
) -> Result<Option<Vec<GroupEntry>>, FormatError> {
    if let Some(msg) = header.find(MessageType::SymbolTable) {
        let table = SymbolTableMessage::parse(&msg.data, offset_size)?;
        return read_symbol_table_entries(data, &table, offset_size, length_size).map(Some);
    }

    let link_info = header
        .find(MessageType::LinkInfo)
        .map(|msg| LinkInfoMessage::parse(&msg.data, offset_size))
        .transpose()?;
    if link_info.is_some_and(|info| info.is_dense()) {
        return Err(FormatError::DenseLinkStorage);
    }

    let mut entries = Vec::new();
    let mut has_links = false;
    for msg in header.find_all(MessageType::Link) {
        has_links = true;
        let link = LinkMessage::parse(&msg.data, offset_size)?;
        if let LinkTarget::Hard(address) = link.target {
            entries.push(GroupEntry {
                name: link.name,
                object_header_address: address,
            });
        }
    }

    if link_info.is_some() || has_links {
        Ok(Some(entries))
    } else {
        Ok(None)
    }
}

/// Resolve a slash-separated path from the group at `root_address` to an
/// object header address. Empty components are ignored, so `"/"` and `""`
/// name the root group itself.
pub fn resolve_path(
    data: &[u8],
    root_address: u64,
    path: &str,
    offset_size: u8,
    length_size: u8,
) -> Result<u64, FormatError> {
    let mut current = root_address;
    let mut walked = String::new();
    for component in path.split('/').filter(|c| !c.is_empty()) {
        let header = ObjectHeader::parse(data, current, offset_size, length_size)?;
        let members = group_members(data, &header, offset_size, length_size)?
            .ok_or_else(|| FormatError::NotAGroup(walked.clone()))?;
        walked.push('/');
        walked.push_str(component);
        current = members
            .into_iter()
            .find(|e| e.name == component)
            .map(|e| e.object_header_address)
            .ok_or_else(|| FormatError::PathNotFound(walked.clone()))?;
    }
    Ok(current)
}
