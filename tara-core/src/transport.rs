// tara-core/src/transport.rs
//
// Byte-stream links to hardware. Real devices are serial ports; mock devices
// hand out one end of an in-memory duplex pipe.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, StopBits};
use tracing::info;

use crate::Error;

pub trait Link: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Link for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type BoxedLink = Box<dyn Link>;

/// Opens `port` as 8N1 at `baudrate`.
pub fn open_serial(port: &str, baudrate: u32) -> Result<BoxedLink, Error> {
    let stream = tokio_serial::new(port, baudrate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .timeout(Duration::from_millis(100))
        .open_native_async()
        .map_err(|e| Error::Serial(format!("cannot open {port} at {baudrate} baud: {e}")))?;

    info!("Opened serial port {} at {} baud", port, baudrate);
    Ok(Box::new(stream))
}
