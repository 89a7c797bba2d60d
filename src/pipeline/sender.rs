use std::net::UdpSocket;

use anyhow::{Context, Result};
use bytes::{BufMut, BytesMut};

use crate::types::{HolisticFrame, LandmarkStream};

/// Serialises a processed frame into one datagram.
pub trait WirePacker: Send {
    fn pack(&self, frame: &HolisticFrame, out: &mut BytesMut);
}

/// `f64` time, then pose world, left world, right world and face landmark
/// sections (`u32` count, four `f32` each), then blendshapes (`u32` count, one
/// `f32` each). Absent parts are written as empty sections. Little-endian.
#[derive(Clone, Copy, Debug, Default)]
pub struct BinaryPacker;

fn put_stream(out: &mut BytesMut, stream: Option<&LandmarkStream>, sign: f32) {
    let Some(stream) = stream else {
        out.put_u32_le(0);
        return;
    };
    out.put_u32_le(stream.len() as u32);
    for lm in stream.iter() {
        out.put_f32_le(lm.x * sign);
        out.put_f32_le(lm.y * sign);
        out.put_f32_le(lm.z * sign);
        out.put_f32_le(lm.confidence);
    }
}

impl WirePacker for BinaryPacker {
    fn pack(&self, frame: &HolisticFrame, out: &mut BytesMut) {
        out.put_f64_le(frame.time_s);
        // Receivers expect the pose in a mirrored world frame.
        put_stream(out, frame.pose.world.as_ref(), -1.0);
        put_stream(out, frame.hands.left.world.as_ref(), 1.0);
        put_stream(out, frame.hands.right.world.as_ref(), 1.0);
        put_stream(out, frame.face.landmarks.as_ref(), 1.0);

        let blendshapes = frame.face.blendshapes.as_deref().unwrap_or_default();
        out.put_u32_le(blendshapes.len() as u32);
        for weight in blendshapes {
            out.put_f32_le(*weight);
        }
    }
}

/// Fire-and-forget UDP delivery of processed frames.
pub struct UdpDispatcher {
    socket: UdpSocket,
    packer: Box<dyn WirePacker>,
    buf: BytesMut,
}

impl UdpDispatcher {
    pub fn connect(addr: &str) -> Result<Self> {
        Self::with_packer(addr, Box::new(BinaryPacker))
    }

    pub fn with_packer(addr: &str, packer: Box<dyn WirePacker>) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").context("failed to bind sender socket")?;
        socket
            .connect(addr)
            .with_context(|| format!("failed to resolve landmark receiver {addr}"))?;
        log::info!("sending landmarks to {addr}");
        Ok(Self {
            socket,
            packer,
            buf: BytesMut::with_capacity(16 * 1024),
        })
    }

    /// Returns false if the datagram could not be sent; the frame is not retried.
    pub fn send(&mut self, frame: &HolisticFrame) -> bool {
        self.buf.clear();
        self.packer.pack(frame, &mut self.buf);
        match self.socket.send(&self.buf) {
            Ok(_) => true,
            Err(err) => {
                log::debug!("dropping landmark datagram: {err}");
                false
            }
        }
    }
}
