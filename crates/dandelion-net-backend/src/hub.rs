//! TCP bridge to a packet hub.
//!
//! Wire format: each frame is a 2-byte big-endian byte length followed by
//! the payload as 16-bit big-endian words. A background reader thread (owned by
//! this link, standing in for the capture library's callback thread) parses
//! inbound frames and pushes them into the simulation's [`FrameSender`];
//! the drop-when-disabled/drop-when-full policy lives entirely in the
//! queue.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::thread::JoinHandle;

use crate::{FrameSender, HostLink};

pub struct HubLink {
    stream: TcpStream,
    reader: Option<JoinHandle<()>>,
}

impl HubLink {
    /// Connects to the hub and starts the receive thread.
    pub fn connect<A: ToSocketAddrs>(addr: A, sender: FrameSender) -> std::io::Result<HubLink> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let rx_stream = stream.try_clone()?;
        let reader = std::thread::Builder::new()
            .name("hub-receive".into())
            .spawn(move || receive_loop(rx_stream, sender))?;
        Ok(HubLink {
            stream,
            reader: Some(reader),
        })
    }
}

fn receive_loop(mut stream: TcpStream, sender: FrameSender) {
    loop {
        let mut header = [0u8; 2];
        if let Err(err) = stream.read_exact(&mut header) {
            tracing::warn!("hub receive thread stopping: {err}");
            return;
        }
        let len = u16::from_be_bytes(header) as usize;

        let mut raw = vec![0u8; len];
        if let Err(err) = stream.read_exact(&mut raw) {
            tracing::warn!("hub receive thread stopping mid-frame: {err}");
            return;
        }
        if len % 2 != 0 {
            tracing::warn!(len, "odd-length hub frame, trailing byte ignored");
        }

        let frame: Vec<u16> = raw
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        // Drops (receiver off, queue full) are counted by the queue; the
        // hub keeps reading either way.
        let _ = sender.push(frame);
    }
}

impl HostLink for HubLink {
    fn send(&mut self, frame: &[u16]) {
        let Ok(len) = u16::try_from(frame.len() * 2) else {
            tracing::warn!(len = frame.len(), "oversized frame not sent to hub");
            return;
        };

        let mut raw = Vec::with_capacity(2 + frame.len() * 2);
        raw.extend_from_slice(&len.to_be_bytes());
        for &word in frame {
            raw.extend_from_slice(&word.to_be_bytes());
        }
        if let Err(err) = self.stream.write_all(&raw) {
            tracing::warn!("hub send failed: {err}");
        }
    }

    fn shutdown(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl Drop for HubLink {
    fn drop(&mut self) {
        self.shutdown();
    }
}
