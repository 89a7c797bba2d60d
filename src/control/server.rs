use std::{
    io::{self, BufRead, BufReader, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::{Context, Result};

use super::servicer::ControlServicer;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const READ_TIMEOUT: Duration = Duration::from_millis(200);
/// A client that stops reading is dropped after this long.
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Serves newline-delimited JSON control requests on a background thread.
#[derive(Debug)]
pub struct ControlServer {
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ControlServer {
    pub fn start(addr: SocketAddr, servicer: ControlServicer) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .with_context(|| format!("failed to bind control server on {addr}"))?;
        listener
            .set_nonblocking(true)
            .context("failed to make control listener non-blocking")?;
        let local_addr = listener.local_addr()?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = thread::Builder::new()
            .name("control-server".to_string())
            .spawn(move || accept_loop(listener, servicer, stop_flag))
            .context("failed to spawn control server thread")?;

        log::info!("control server listening on {local_addr}");
        Ok(Self {
            local_addr,
            stop,
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            log::info!("control server stopped");
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn accept_loop(listener: TcpListener, servicer: ControlServicer, stop: Arc<AtomicBool>) {
    let mut connections = Vec::new();
    while !stop.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                log::debug!("control client connected from {peer}");
                let servicer = servicer.clone();
                let stop = stop.clone();
                connections.push(thread::spawn(move || {
                    if let Err(err) = serve_connection(stream, &servicer, &stop) {
                        log::warn!("control connection from {peer} closed: {err}");
                    }
                }));
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) => {
                log::warn!("control accept failed: {err}");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
        connections.retain(|handle| !handle.is_finished());
    }

    for handle in connections {
        let _ = handle.join();
    }
}

fn serve_connection(stream: TcpStream, servicer: &ControlServicer, stop: &AtomicBool) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    while !stop.load(Ordering::Relaxed) {
        match reader.read_line(&mut line) {
            Ok(0) => return Ok(()),
            Ok(_) => {
                let request = line.trim();
                if !request.is_empty() {
                    let mut reply = servicer.handle_line(request);
                    reply.push('\n');
                    writer.write_all(reply.as_bytes())?;
                    writer.flush()?;
                }
                line.clear();
            }
            // Partial input stays buffered in `line` until the rest arrives.
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
