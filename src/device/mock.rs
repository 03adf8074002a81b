use crate::Device;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// In-memory device whose `recv` blocks like a real tun descriptor.
#[derive(Clone)]
pub struct MockDevice {
    inner: Arc<Inner>,
}

struct Inner {
    rx_queue: Mutex<VecDeque<Vec<u8>>>,
    rx_ready: Condvar,
    tx_log: Mutex<Vec<Vec<u8>>>,
    released: AtomicBool,
    release_errno: Mutex<Option<i32>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                rx_queue: Mutex::new(VecDeque::new()),
                rx_ready: Condvar::new(),
                tx_log: Mutex::new(Vec::new()),
                released: AtomicBool::new(false),
                release_errno: Mutex::new(None),
            }),
        }
    }

    pub fn inject_packet(&self, desc: &str, packet: Vec<u8>) {
        println!("🧪 INJECT: {} ({} bytes)", desc, packet.len());
        self.inner.rx_queue.lock().unwrap().push_back(packet);
        self.inner.rx_ready.notify_one();
    }

    pub fn get_sent_packets(&self) -> Vec<Vec<u8>> {
        self.inner.tx_log.lock().unwrap().clone()
    }

    pub fn pending(&self) -> usize {
        self.inner.rx_queue.lock().unwrap().len()
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Make the next `release` report `errno` (the handle still counts as released)
    pub fn fail_release(&self, errno: i32) {
        *self.inner.release_errno.lock().unwrap() = Some(errno);
    }
}

impl Device for MockDevice {
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut queue = self.inner.rx_queue.lock().unwrap();
        loop {
            if let Some(packet) = queue.pop_front() {
                let len = packet.len().min(buf.len());
                buf[..len].copy_from_slice(&packet[..len]);
                return Ok(len);
            }
            queue = self.inner.rx_ready.wait(queue).unwrap();
        }
    }

    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        println!("📤 SEND: {} bytes", buf.len());
        self.inner.tx_log.lock().unwrap().push(buf.to_vec());
        Ok(buf.len())
    }

    fn release(self) -> io::Result<()> {
        self.inner.released.store(true, Ordering::SeqCst);
        match self.inner.release_errno.lock().unwrap().take() {
            Some(errno) => Err(io::Error::from_raw_os_error(errno)),
            None => Ok(()),
        }
    }
}
