use fileserver::config::AcceptPolicy;
use fileserver::server::listener::{accept_ready, bind};
use fileserver::server::poller::Poller;
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

fn backlog_of(n: usize) -> (std::net::TcpListener, Vec<TcpStream>) {
    let listener = bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let clients = (0..n).map(|_| TcpStream::connect(addr).unwrap()).collect();
    thread::sleep(Duration::from_millis(50));
    (listener, clients)
}

#[test]
fn test_single_policy_takes_one_connection_per_notification() {
    let (listener, _clients) = backlog_of(3);
    let poller = Poller::new().unwrap();

    assert_eq!(accept_ready(&listener, &poller, AcceptPolicy::Single), 1);
    assert_eq!(accept_ready(&listener, &poller, AcceptPolicy::Single), 1);
    assert_eq!(accept_ready(&listener, &poller, AcceptPolicy::Single), 1);
    assert_eq!(accept_ready(&listener, &poller, AcceptPolicy::Single), 0);
}

#[test]
fn test_drain_policy_empties_the_backlog() {
    let (listener, _clients) = backlog_of(3);
    let poller = Poller::new().unwrap();

    assert_eq!(accept_ready(&listener, &poller, AcceptPolicy::Drain), 3);
    assert_eq!(accept_ready(&listener, &poller, AcceptPolicy::Drain), 0);
}
