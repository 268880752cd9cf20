//! Service commands run directly against global memory.

use std::sync::atomic::{Ordering, fence};

use clcpu_device::{GlobalMemory, Result};

use crate::command::ServiceCommand;

pub(crate) fn execute(service: &ServiceCommand, memory: &GlobalMemory) -> Result<()> {
    match service {
        // Commands ahead of it on this worker already ran; publish their writes.
        ServiceCommand::Marker | ServiceCommand::Barrier => fence(Ordering::SeqCst),
        ServiceCommand::ReadBuffer { buffer, offset, len, dst } => {
            let mut dst = dst.lock();
            dst.resize(*len, 0);
            memory.read(*buffer, *offset, &mut dst[..])?;
        }
        ServiceCommand::WriteBuffer { buffer, offset, data } => memory.write(*buffer, *offset, data)?,
        ServiceCommand::CopyBuffer { src, src_offset, dst, dst_offset, len } => {
            memory.copy(*src, *src_offset, *dst, *dst_offset, *len)?
        }
        ServiceCommand::FillBuffer { buffer, offset, pattern, len } => memory.fill(*buffer, *offset, pattern, *len)?,
    }
    Ok(())
}
