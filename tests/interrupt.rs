//! SIGINT handling against a real blocking wait
//!
//! Kept in its own test binary: it installs a process-wide SIGINT handler.

#![cfg(target_os = "linux")]

use std::io;
use std::net::Ipv4Addr;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use pingr::config::Config;
use pingr::export::{Reporter, SummaryFormat};
use pingr::ping::{Pinger, StopFlag, install_interrupt_handler};
use pingr::probe::socket::{Readiness, Received, Transport};
use pingr::state::{Session, Target};
use pingr::timing::TimeVal;

/// Sends go nowhere; waits block in poll(2) on no descriptors, so only the
/// timeout or a signal ends them
struct IdleTransport;

impl Transport for IdleTransport {
    fn send(&mut self, frame: &[u8], _dest: Ipv4Addr) -> io::Result<usize> {
        Ok(frame.len())
    }

    fn receive(&mut self, _buf: &mut [u8]) -> io::Result<Received> {
        Err(io::ErrorKind::WouldBlock.into())
    }

    fn wait_readable(&mut self, timeout: TimeVal) -> io::Result<Readiness> {
        let ret = unsafe { libc::poll(std::ptr::null_mut(), 0, timeout.poll_timeout_ms()) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Readiness::Timeout)
    }
}

#[test]
fn test_sigint_interrupts_wait_immediately() {
    let stop = StopFlag::new();
    install_interrupt_handler(&stop).unwrap();

    let (tx, rx) = mpsc::channel();
    let pinger_thread = thread::spawn(move || {
        tx.send(unsafe { libc::pthread_self() }).unwrap();

        let config = Config {
            interval: Duration::from_secs(5),
            ..Config::default()
        };
        let reporter = Reporter::new(io::sink(), &config, SummaryFormat::Text);
        let target = Target::new("192.0.2.1".to_string(), Ipv4Addr::new(192, 0, 2, 1));
        let session = Session::new(target, config, 0x0101);

        let started = Instant::now();
        let summary = Pinger::new(session, IdleTransport, reporter, stop)
            .run()
            .unwrap();
        (started.elapsed(), summary.transmitted)
    });

    let pinger_tid = rx.recv().unwrap();
    thread::sleep(Duration::from_millis(300));
    let ret = unsafe { libc::pthread_kill(pinger_tid, libc::SIGINT) };
    assert_eq!(ret, 0);

    let (elapsed, transmitted) = pinger_thread.join().unwrap();
    assert!(
        elapsed < Duration::from_secs(2),
        "SIGINT took {:?} to stop the loop",
        elapsed
    );
    assert_eq!(transmitted, 1);
}
