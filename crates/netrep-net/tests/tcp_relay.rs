//! Relay sessions over real TCP sockets on localhost.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use netrep_net::{ClientConfig, RelayClient, RelayServer, ServerConfig, ServerHandle};
use netrep_relay::{
    AnimationPlay, CustomEvent, EntityHandle, ManualClock, RelayDispatcher, StateChange,
};
use tokio::net::TcpListener;

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

async fn start_server() -> (std::net::SocketAddr, Arc<RelayServer>, ServerHandle) {
    let (server, handle) = RelayServer::new(ServerConfig::default());
    let server = Arc::new(server);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let srv = Arc::clone(&server);
    tokio::spawn(async move { srv.run_with_listener(listener).await.unwrap() });
    (addr, server, handle)
}

#[tokio::test]
async fn test_forward_broadcast_round_trip_over_tcp() {
    let (addr, server, handle) = start_server().await;
    let mut authority = RelayDispatcher::new(handle, ManualClock::new(0.0));

    let mut observers = Vec::new();
    for _ in 0..2 {
        let client = RelayClient::connect(addr, ClientConfig::default())
            .await
            .unwrap();
        observers.push(RelayDispatcher::new(client, ManualClock::new(0.0)));
    }
    settle().await;
    assert_eq!(server.connection_count(), 2);

    let logs: Vec<Rc<RefCell<Vec<String>>>> = observers
        .iter_mut()
        .map(|obs| {
            let log = Rc::new(RefCell::new(Vec::new()));
            let sink = Rc::clone(&log);
            obs.listeners_mut()
                .on_custom_event(move |_, e| sink.borrow_mut().push(e.data.clone()));
            log
        })
        .collect();

    observers[0]
        .replicate(
            EntityHandle(7),
            StateChange::CustomEvent(CustomEvent::new("Jump", "height=2.0")),
        )
        .unwrap();
    settle().await;

    let inbound = authority.transport().drain();
    for message in inbound {
        authority.receive(message).unwrap();
    }
    assert_eq!(authority.snapshot().total_replications, 1);
    settle().await;

    for obs in &mut observers {
        let inbound = obs.transport().drain();
        for message in inbound {
            obs.receive(message).unwrap();
        }
    }
    for log in &logs {
        assert_eq!(*log.borrow(), vec!["height=2.0".to_string()]);
    }

    server.shutdown();
}

#[tokio::test]
async fn test_authority_animation_fans_out() {
    let (addr, server, handle) = start_server().await;
    let mut authority = RelayDispatcher::new(handle, ManualClock::new(0.0));
    let client = RelayClient::connect(addr, ClientConfig::default())
        .await
        .unwrap();
    let mut observer = RelayDispatcher::new(client, ManualClock::new(0.0));
    settle().await;

    let montages = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&montages);
    observer
        .listeners_mut()
        .on_animation(move |_, anim| sink.borrow_mut().push(anim.montage.to_string()));

    authority
        .replicate(
            EntityHandle(1),
            StateChange::AnimationPlay(AnimationPlay::new("/Game/Anims/Wave")),
        )
        .unwrap();
    settle().await;

    let inbound = observer.transport().drain();
    for message in inbound {
        observer.receive(message).unwrap();
    }
    assert_eq!(*montages.borrow(), vec!["/Game/Anims/Wave".to_string()]);
    assert!(authority.transport().counters().snapshot_and_reset().messages_sent >= 1);

    server.shutdown();
}
