//! The superstep driver: the algorithm behind `World::sync`.
//!
//! A sync closes the current superstep. Counts of pending puts, gets and
//! messages are exchanged first, so every drain loop below receives an
//! exact number of frames; nothing is sentinel-terminated and nothing can
//! be left behind in the fabric. Three barriers bound the exchange:
//! barrier-in before the counts, barrier-mid between serving get requests
//! and resolving their responses, barrier-out to open the next superstep.

use crate::error::{Error, Result};
use crate::fabric::{Fabric, FabricComm};
use crate::protocol::{
    Category, GetRequestHeader, GetResponseHeader, MessageHeader, PutHeader,
    GET_RESPONSE_HEADER_LEN, MESSAGE_HEADER_LEN, PUT_HEADER_LEN,
};
use crate::world::WorldState;
use std::ptr;
use tracing::trace;

fn desync(err: anyhow::Error) -> Error {
    Error::ProtocolDesync(err.to_string())
}

pub(crate) fn run(state: &WorldState) -> Result<()> {
    let my_pe = state.my_pe();
    let fabric = state.fabric();

    // the previous superstep's delivery is consumed; inboxes refill below
    state.registry.lock().clear_inboxes();

    fabric.barrier()?;

    let (put_counts, get_counts, msg_counts, local_gets) = {
        let counters = state.counters.lock();
        (
            counters.put_counts.clone(),
            counters.get_counts.clone(),
            counters.msg_counts.clone(),
            counters.local_gets,
        )
    };
    let remote_puts = fabric.reduce_scatter_sum(&put_counts)?;
    let remote_gets = fabric.reduce_scatter_sum(&get_counts)?;
    let remote_msgs = fabric.reduce_scatter_sum(&msg_counts)?;
    trace!(
        "[{}] superstep {}: {} puts, {} get requests, {} messages inbound",
        my_pe,
        state.epoch(),
        remote_puts,
        remote_gets,
        remote_msgs
    );

    drain_puts(state, fabric, remote_puts)?;
    serve_gets(state, fabric, remote_gets)?;

    fabric.barrier()?;

    resolve_gets(fabric, local_gets)?;
    deliver_messages(state, fabric, remote_msgs)?;

    state.counters.lock().reset();
    state.advance_epoch();

    fabric.barrier()?;
    Ok(())
}

/// Apply incoming one-sided writes to their registered cells.
fn drain_puts(state: &WorldState, fabric: &Fabric, mut remote_puts: i64) -> Result<()> {
    while remote_puts > 0 {
        let frame = fabric.recv_any(Category::VarPut)?;
        let header = PutHeader::decode(&frame.payload).map_err(desync)?;
        let data = &frame.payload[PUT_HEADER_LEN..];
        let location = state.registry.lock().location(header.var_id).ok_or_else(|| {
            Error::ProtocolDesync(format!(
                "put from processor {} names unregistered variable {}",
                frame.src, header.var_id
            ))
        })?;
        let offset = header.byte_offset as usize;
        if offset + data.len() > location.size {
            return Err(Error::ProtocolDesync(format!(
                "put of {} bytes at offset {} overruns variable {} ({} bytes)",
                data.len(),
                offset,
                header.var_id,
                location.size
            )));
        }
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), (location.addr + offset) as *mut u8, data.len());
        }
        remote_puts -= 1;
    }
    Ok(())
}

/// Answer incoming one-sided reads from the registered cells. Runs after
/// the puts are applied, so a get observes the superstep's writes.
fn serve_gets(state: &WorldState, fabric: &Fabric, mut remote_gets: i64) -> Result<()> {
    while remote_gets > 0 {
        let frame = fabric.recv_any(Category::VarGetRequest)?;
        let header = GetRequestHeader::decode(&frame.payload).map_err(desync)?;
        let location = state.registry.lock().location(header.var_id).ok_or_else(|| {
            Error::ProtocolDesync(format!(
                "get from processor {} names unregistered variable {}",
                frame.src, header.var_id
            ))
        })?;
        let offset = header.byte_offset as usize;
        let data_size = header.count as usize * header.elem_size as usize;
        if offset + data_size > location.size {
            return Err(Error::ProtocolDesync(format!(
                "get of {} bytes at offset {} overruns variable {} ({} bytes)",
                data_size, offset, header.var_id, location.size
            )));
        }
        let mut payload = Vec::with_capacity(GET_RESPONSE_HEADER_LEN + data_size);
        GetResponseHeader {
            target: header.target,
            data_size: data_size as u64,
        }
        .encode_into(&mut payload);
        unsafe {
            let cell = std::slice::from_raw_parts((location.addr + offset) as *const u8, data_size);
            payload.extend_from_slice(cell);
        }
        fabric.send_bytes(frame.src, Category::VarGetResponse, payload)?;
        remote_gets -= 1;
    }
    Ok(())
}

/// Write get responses through the opaque target pointers they echo back.
/// The pointers are this processor's own future slots, valid by the
/// contract that a future outlives the sync that fulfils it.
fn resolve_gets(fabric: &Fabric, mut local_gets: i64) -> Result<()> {
    while local_gets > 0 {
        let frame = fabric.recv_any(Category::VarGetResponse)?;
        let header = GetResponseHeader::decode(&frame.payload).map_err(desync)?;
        let data = &frame.payload[GET_RESPONSE_HEADER_LEN..];
        if data.len() != header.data_size as usize {
            return Err(Error::ProtocolDesync(format!(
                "get response carries {} bytes but declares {}",
                data.len(),
                header.data_size
            )));
        }
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), header.target as usize as *mut u8, data.len());
        }
        local_gets -= 1;
    }
    Ok(())
}

/// Append incoming messages to their queues' inboxes, in arrival order.
fn deliver_messages(state: &WorldState, fabric: &Fabric, mut remote_msgs: i64) -> Result<()> {
    while remote_msgs > 0 {
        let frame = fabric.recv_any(Category::Message)?;
        let header = MessageHeader::decode(&frame.payload).map_err(desync)?;
        let tag_end = MESSAGE_HEADER_LEN + header.tag_size as usize;
        let content_end = tag_end + header.content_size as usize;
        if content_end > frame.payload.len() {
            return Err(Error::ProtocolDesync(format!(
                "message frame of {} bytes declares {} tag + {} content bytes",
                frame.payload.len(),
                header.tag_size,
                header.content_size
            )));
        }
        let sink = state.registry.lock().queue(header.queue_id).ok_or_else(|| {
            Error::ProtocolDesync(format!(
                "message from processor {} names unregistered queue {}",
                frame.src, header.queue_id
            ))
        })?;
        sink.append(
            &frame.payload[MESSAGE_HEADER_LEN..tag_end],
            &frame.payload[tag_end..content_end],
        )
        .map_err(desync)?;
        remote_msgs -= 1;
    }
    Ok(())
}
