//! Linux SCSI generic (`/dev/sgN`) pass-through via the `SG_IO` ioctl.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use tracing::debug;
use trcc_core::TransportError;

use crate::consts::IO_TIMEOUT;
use crate::ScsiTransport;

const SG_IO: libc::c_ulong = 0x2285;
const SG_DXFER_TO_DEV: libc::c_int = -2;
const SG_DXFER_FROM_DEV: libc::c_int = -3;
const SG_INFO_OK_MASK: libc::c_uint = 0x1;
const SENSE_LEN: usize = 32;

#[repr(C)]
struct SgIoHdr {
    interface_id: libc::c_int,
    dxfer_direction: libc::c_int,
    cmd_len: libc::c_uchar,
    mx_sb_len: libc::c_uchar,
    iovec_count: libc::c_ushort,
    dxfer_len: libc::c_uint,
    dxferp: *mut libc::c_void,
    cmdp: *const libc::c_uchar,
    sbp: *mut libc::c_uchar,
    timeout: libc::c_uint,
    flags: libc::c_uint,
    pack_id: libc::c_int,
    usr_ptr: *mut libc::c_void,
    status: libc::c_uchar,
    masked_status: libc::c_uchar,
    msg_status: libc::c_uchar,
    sb_len_wr: libc::c_uchar,
    host_status: libc::c_ushort,
    driver_status: libc::c_ushort,
    resid: libc::c_int,
    duration: libc::c_uint,
    info: libc::c_uint,
}

/// Pass-through handle for one sg node
pub struct SgTransport {
    path: PathBuf,
    file: Option<File>,
}

impl SgTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    fn execute(
        &mut self,
        cdb: &[u8; 16],
        direction: libc::c_int,
        buf: *mut libc::c_void,
        len: usize,
    ) -> Result<usize, TransportError> {
        let file = self.file.as_ref().ok_or(TransportError::NotOpen)?;
        let dxfer_len = libc::c_uint::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "transfer too large"))?;
        let mut sense = [0u8; SENSE_LEN];
        let mut hdr = SgIoHdr {
            interface_id: b'S' as libc::c_int,
            dxfer_direction: direction,
            cmd_len: cdb.len() as libc::c_uchar,
            mx_sb_len: SENSE_LEN as libc::c_uchar,
            iovec_count: 0,
            dxfer_len,
            dxferp: buf,
            cmdp: cdb.as_ptr(),
            sbp: sense.as_mut_ptr(),
            timeout: IO_TIMEOUT.as_millis() as libc::c_uint,
            flags: 0,
            pack_id: 0,
            usr_ptr: std::ptr::null_mut(),
            status: 0,
            masked_status: 0,
            msg_status: 0,
            sb_len_wr: 0,
            host_status: 0,
            driver_status: 0,
            resid: 0,
            duration: 0,
            info: 0,
        };
        // SAFETY: hdr points at cdb, sense and buf, all of which outlive the call, and
        // dxfer_len never exceeds the length of buf.
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), SG_IO, &mut hdr as *mut SgIoHdr) };
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }
        if hdr.info & SG_INFO_OK_MASK != 0 || hdr.status != 0 || hdr.host_status != 0 {
            debug!(
                status = hdr.status,
                host = hdr.host_status,
                driver = hdr.driver_status,
                sense = ?&sense[..hdr.sb_len_wr as usize],
                "sg command failed"
            );
            return Err(io::Error::other(format!(
                "scsi status {:#04x}, host {:#06x}, driver {:#06x}",
                hdr.status, hdr.host_status, hdr.driver_status
            ))
            .into());
        }
        Ok(len.saturating_sub(hdr.resid.max(0) as usize))
    }
}

impl ScsiTransport for SgTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        if self.file.is_none() {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(&self.path)?;
            self.file = Some(file);
        }
        Ok(())
    }

    fn close(&mut self) {
        self.file = None;
    }

    fn read(&mut self, cdb: &[u8; 16], len: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; len];
        let read = self.execute(cdb, SG_DXFER_FROM_DEV, buf.as_mut_ptr().cast(), len)?;
        buf.truncate(read);
        Ok(buf)
    }

    fn write(&mut self, cdb: &[u8; 16], data: &[u8]) -> Result<(), TransportError> {
        // The kernel only reads from the buffer for TO_DEV transfers
        let written = self.execute(
            cdb,
            SG_DXFER_TO_DEV,
            data.as_ptr() as *mut libc::c_void,
            data.len(),
        )?;
        if written != data.len() {
            return Err(TransportError::ShortTransfer {
                expected: data.len(),
                actual: written,
            });
        }
        Ok(())
    }
}
