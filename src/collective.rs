//! Collective operations layered over the point-to-point primitives of
//! `Substrate` (§4.5). Every operation below reserves one of the 16 tag
//! values `Tag::collective` carves out of the top of the tag space, so
//! these never collide with a graph edge's tag.
//!
//! Reduction folds (`reduce`/`all_reduce`) run on raw byte buffers: the
//! caller supplies an associative `op: Fn(Vec<u8>, Vec<u8>) -> Vec<u8>` and
//! is responsible for its own encode/decode, matching the crate-wide policy
//! that typed (de)serialization is the application's job, not the
//! substrate's.

use crate::error::{CageError, MappingError};
use crate::substrate::Substrate;
use crate::transport::Context;
use crate::vaddr::{Tag, VAddr};

const BARRIER_TAG: Tag = Tag::collective(4);
const GATHER_TAG: Tag = Tag::collective(5);
const GATHER_VAR_TAG: Tag = Tag::collective(6);
const ALL_GATHER_BROADCAST_TAG: Tag = Tag::collective(7);
const SCATTER_TAG: Tag = Tag::collective(8);
const ALL_TO_ALL_TAG: Tag = Tag::collective(9);
const REDUCE_TAG: Tag = Tag::collective(10);
const ALL_REDUCE_BROADCAST_TAG: Tag = Tag::collective(11);
const BROADCAST_TAG: Tag = Tag::collective(12);

fn sorted_members(ctx: &Context) -> Vec<VAddr> {
    let mut members = ctx.members().to_vec();
    members.sort_unstable();
    members
}

/// Root sends `payload` to every other member; everyone returns the value
/// (the root's own copy, or what it received).
pub async fn broadcast<S: Substrate>(
    substrate: &S,
    ctx: &Context,
    root: VAddr,
    payload: Vec<u8>,
) -> Result<Vec<u8>, CageError> {
    if substrate.vaddr() == root {
        for &member in ctx.members().iter().filter(|&&m| m != root) {
            substrate
                .async_send(member, BROADCAST_TAG, ctx.id(), payload.clone())
                .await
                .wait()
                .await
                .map_err(CageError::Transport)?;
        }
        Ok(payload)
    } else {
        substrate
            .async_recv(root, BROADCAST_TAG, ctx.id())
            .await
            .wait()
            .await
            .map_err(CageError::Transport)
    }
}

/// Every member sends one value to `root`; `root` assembles them in
/// VAddr-ascending order. Non-root members get `None`.
pub async fn gather<S: Substrate>(
    substrate: &S,
    ctx: &Context,
    root: VAddr,
    input: Vec<u8>,
) -> Result<Option<Vec<Vec<u8>>>, CageError> {
    gather_with_tag(substrate, ctx, root, input, GATHER_TAG).await
}

/// Like [`gather`], but members may contribute differently sized buffers;
/// each inner `Vec<u8>`'s length is that peer's per-peer count.
pub async fn gather_var<S: Substrate>(
    substrate: &S,
    ctx: &Context,
    root: VAddr,
    input: Vec<u8>,
) -> Result<Option<Vec<Vec<u8>>>, CageError> {
    gather_with_tag(substrate, ctx, root, input, GATHER_VAR_TAG).await
}

async fn gather_with_tag<S: Substrate>(
    substrate: &S,
    ctx: &Context,
    root: VAddr,
    input: Vec<u8>,
    tag: Tag,
) -> Result<Option<Vec<Vec<u8>>>, CageError> {
    if substrate.vaddr() == root {
        let mut by_peer = std::collections::HashMap::new();
        by_peer.insert(root, input);
        for &member in ctx.members().iter().filter(|&&m| m != root) {
            let bytes = substrate
                .async_recv(member, tag, ctx.id())
                .await
                .wait()
                .await
                .map_err(CageError::Transport)?;
            by_peer.insert(member, bytes);
        }
        Ok(Some(
            sorted_members(ctx)
                .into_iter()
                .map(|v| by_peer.remove(&v).expect("every member contributed"))
                .collect(),
        ))
    } else {
        substrate
            .async_send(root, tag, ctx.id(), input)
            .await
            .wait()
            .await
            .map_err(CageError::Transport)?;
        Ok(None)
    }
}

/// `gather` then `broadcast` the assembled result to everyone.
pub async fn all_gather<S: Substrate>(substrate: &S, ctx: &Context, input: Vec<u8>) -> Result<Vec<Vec<u8>>, CageError> {
    all_gather_with_tag(substrate, ctx, input, GATHER_TAG).await
}

/// Variable-size counterpart of [`all_gather`].
pub async fn all_gather_var<S: Substrate>(
    substrate: &S,
    ctx: &Context,
    input: Vec<u8>,
) -> Result<Vec<Vec<u8>>, CageError> {
    all_gather_with_tag(substrate, ctx, input, GATHER_VAR_TAG).await
}

async fn all_gather_with_tag<S: Substrate>(
    substrate: &S,
    ctx: &Context,
    input: Vec<u8>,
    tag: Tag,
) -> Result<Vec<Vec<u8>>, CageError> {
    let root = ctx.coordinator().ok_or(CageError::Mapping(MappingError::InconsistentGraph))?;
    let gathered = gather_with_tag(substrate, ctx, root, input, tag).await?;

    let encoded = gathered.map(encode_frames).unwrap_or_default();
    let blob = broadcast_with_tag(substrate, ctx, root, encoded, ALL_GATHER_BROADCAST_TAG).await?;
    Ok(decode_frames(&blob))
}

fn encode_frames(frames: Vec<Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(frames.len() as u32).to_le_bytes());
    for frame in frames {
        out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        out.extend_from_slice(&frame);
    }
    out
}

fn decode_frames(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut cursor = bytes;
    if cursor.len() < 4 {
        return Vec::new();
    }
    let count = u32::from_le_bytes(cursor[..4].try_into().unwrap()) as usize;
    cursor = &cursor[4..];
    let mut frames = Vec::with_capacity(count);
    for _ in 0..count {
        let len = u32::from_le_bytes(cursor[..4].try_into().unwrap()) as usize;
        cursor = &cursor[4..];
        frames.push(cursor[..len].to_vec());
        cursor = &cursor[len..];
    }
    frames
}

/// Root sends one slice of `inputs` (ordered by VAddr-ascending membership)
/// to each member; every member, including the root, returns its own slice.
pub async fn scatter<S: Substrate>(
    substrate: &S,
    ctx: &Context,
    root: VAddr,
    inputs: Option<Vec<Vec<u8>>>,
) -> Result<Vec<u8>, CageError> {
    let members = sorted_members(ctx);
    if substrate.vaddr() == root {
        let inputs = inputs.ok_or(CageError::Mapping(MappingError::InconsistentGraph))?;
        if inputs.len() != members.len() {
            return Err(CageError::Mapping(MappingError::EdgeArityMismatch {
                in_edges: inputs.len(),
                out_edges: members.len(),
            }));
        }
        let mut own_slice = Vec::new();
        for (member, slice) in members.iter().zip(inputs.into_iter()) {
            if *member == root {
                own_slice = slice;
            } else {
                substrate
                    .async_send(*member, SCATTER_TAG, ctx.id(), slice)
                    .await
                    .wait()
                    .await
                    .map_err(CageError::Transport)?;
            }
        }
        Ok(own_slice)
    } else {
        substrate
            .async_recv(root, SCATTER_TAG, ctx.id())
            .await
            .wait()
            .await
            .map_err(CageError::Transport)
    }
}

/// Every member sends one slice to every other member and receives one
/// slice from each; `inputs[i]` is addressed to `sorted_members(ctx)[i]`.
pub async fn all_to_all<S: Substrate>(
    substrate: &S,
    ctx: &Context,
    inputs: Vec<Vec<u8>>,
) -> Result<Vec<Vec<u8>>, CageError> {
    let members = sorted_members(ctx);
    if inputs.len() != members.len() {
        return Err(CageError::Mapping(MappingError::EdgeArityMismatch {
            in_edges: inputs.len(),
            out_edges: members.len(),
        }));
    }
    let local_index = members
        .iter()
        .position(|&m| m == substrate.vaddr())
        .ok_or(CageError::Protocol(crate::error::ProtocolError::InvalidContext(ctx.id().0)))?;

    for (peer_index, peer) in members.iter().enumerate() {
        if *peer == substrate.vaddr() {
            continue;
        }
        substrate
            .async_send(*peer, ALL_TO_ALL_TAG, ctx.id(), inputs[peer_index].clone())
            .await
            .wait()
            .await
            .map_err(CageError::Transport)?;
    }

    let mut received = vec![Vec::new(); members.len()];
    for (peer_index, peer) in members.iter().enumerate() {
        received[peer_index] = if *peer == substrate.vaddr() {
            inputs[local_index].clone()
        } else {
            substrate
                .async_recv(*peer, ALL_TO_ALL_TAG, ctx.id())
                .await
                .wait()
                .await
                .map_err(CageError::Transport)?
        };
    }
    Ok(received)
}

/// Folds `op` over every member's contribution at `root`, in VAddr-ascending
/// order, with the root's own (vertex-local) input folded in first.
pub async fn reduce<S: Substrate>(
    substrate: &S,
    ctx: &Context,
    root: VAddr,
    local_input: Vec<u8>,
    op: impl Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
) -> Result<Option<Vec<u8>>, CageError> {
    if substrate.vaddr() == root {
        let mut accumulator = local_input;
        for &member in sorted_members(ctx).iter().filter(|&&m| m != root) {
            let contribution = substrate
                .async_recv(member, REDUCE_TAG, ctx.id())
                .await
                .wait()
                .await
                .map_err(CageError::Transport)?;
            accumulator = op(accumulator, contribution);
        }
        Ok(Some(accumulator))
    } else {
        substrate
            .async_send(root, REDUCE_TAG, ctx.id(), local_input)
            .await
            .wait()
            .await
            .map_err(CageError::Transport)?;
        Ok(None)
    }
}

/// `reduce` then broadcast the folded result to every member.
pub async fn all_reduce<S: Substrate>(
    substrate: &S,
    ctx: &Context,
    local_input: Vec<u8>,
    op: impl Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
) -> Result<Vec<u8>, CageError> {
    let root = ctx.coordinator().ok_or(CageError::Mapping(MappingError::InconsistentGraph))?;
    let folded = reduce(substrate, ctx, root, local_input, op).await?.unwrap_or_default();
    broadcast_with_tag(substrate, ctx, root, folded, ALL_REDUCE_BROADCAST_TAG).await
}

async fn broadcast_with_tag<S: Substrate>(
    substrate: &S,
    ctx: &Context,
    root: VAddr,
    payload: Vec<u8>,
    tag: Tag,
) -> Result<Vec<u8>, CageError> {
    if substrate.vaddr() == root {
        for &member in ctx.members().iter().filter(|&&m| m != root) {
            substrate
                .async_send(member, tag, ctx.id(), payload.clone())
                .await
                .wait()
                .await
                .map_err(CageError::Transport)?;
        }
        Ok(payload)
    } else {
        substrate.async_recv(root, tag, ctx.id()).await.wait().await.map_err(CageError::Transport)
    }
}

/// Every member contacts the context's coordinator and waits for every
/// other member to do the same before proceeding.
pub async fn barrier<S: Substrate>(substrate: &S, ctx: &Context) -> Result<(), CageError> {
    let coordinator = ctx.coordinator().ok_or(CageError::Mapping(MappingError::InconsistentGraph))?;

    if substrate.vaddr() == coordinator {
        for &member in ctx.members().iter().filter(|&&m| m != coordinator) {
            substrate
                .async_recv(member, BARRIER_TAG, ctx.id())
                .await
                .wait()
                .await
                .map_err(CageError::Transport)?;
        }
        for &member in ctx.members().iter().filter(|&&m| m != coordinator) {
            substrate
                .async_send(member, BARRIER_TAG, ctx.id(), Vec::new())
                .await
                .wait()
                .await
                .map_err(CageError::Transport)?;
        }
    } else {
        substrate
            .async_send(coordinator, BARRIER_TAG, ctx.id(), Vec::new())
            .await
            .wait()
            .await
            .map_err(CageError::Transport)?;
        substrate
            .async_recv(coordinator, BARRIER_TAG, ctx.id())
            .await
            .wait()
            .await
            .map_err(CageError::Transport)?;
    }
    Ok(())
}
