//! End-to-end handshake over a real TCP socket, playing the switch side by
//! hand.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use ofp_core::error::LookupError;
use ofp_core::ofp_header::OfpHeader;
use ofp_core::ofp_message::OfpMessage;
use ofp_core::openflow0x01::message::Message;
use ofp_core::openflow0x01::*;
use ofp_core::SwitchManager;

const DPID: u64 = 0x00163e000001;

fn no_features() -> PortFeatures {
    PortFeatures {
        f_10mbhd: false,
        f_10mbfd: false,
        f_100mbhd: false,
        f_100mbfd: true,
        f_1gbhd: false,
        f_1gbfd: true,
        f_10gbfd: false,
        copper: true,
        fiber: false,
        autoneg: true,
        pause: false,
        pause_asym: false,
    }
}

fn port(no: u16) -> PortDesc {
    PortDesc {
        port_no: no,
        hw_addr: 0x00163e000100 + u64::from(no),
        name: format!("s1-eth{}", no),
        config: PortConfig {
            down: false,
            no_stp: false,
            no_recv: false,
            no_recv_stp: false,
            no_flood: false,
            no_fwd: false,
            no_packet_in: false,
        },
        state: PortState {
            down: false,
            stp_state: StpState::Forward,
        },
        curr: no_features(),
        advertised: no_features(),
        supported: no_features(),
        peer: no_features(),
    }
}

fn features() -> SwitchFeatures {
    SwitchFeatures {
        datapath_id: DPID,
        num_buffers: 256,
        num_tables: 2,
        supported_capabilities: Capabilities {
            flow_stats: true,
            table_stats: true,
            port_stats: true,
            stp: false,
            ip_reasm: false,
            queue_stats: false,
            arp_match_ip: false,
        },
        supported_actions: SupportedActions {
            output: true,
            set_vlan_id: true,
            set_vlan_pcp: true,
            strip_vlan: true,
            set_dl_src: true,
            set_dl_dst: true,
            set_nw_src: true,
            set_nw_dst: true,
            set_nw_tos: true,
            set_tp_src: true,
            set_tp_dst: true,
            enqueue: false,
            vendor: false,
        },
        ports: vec![port(1), port(2)],
    }
}

async fn read_message(conn: &mut TcpStream) -> (u32, Message) {
    let mut hdr = [0u8; 8];
    conn.read_exact(&mut hdr).await.unwrap();
    let header = OfpHeader::parse(&hdr).unwrap();
    let mut body = vec![0; header.length() - OfpHeader::size()];
    conn.read_exact(&mut body).await.unwrap();
    Message::parse(&header, &body).unwrap()
}

async fn write_message(conn: &mut TcpStream, xid: u32, msg: Message) {
    conn.write_all(&Message::marshal(xid, msg)).await.unwrap();
}

#[tokio::test]
async fn switch_connects_over_tcp_and_answers_a_barrier() {
    let manager = Arc::new(SwitchManager::new());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let accept_side = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            manager.handshake(socket).await.unwrap()
        })
    };

    // Switch side of the handshake.
    let mut conn = TcpStream::connect(addr).await.unwrap();
    let (_, hello) = read_message(&mut conn).await;
    assert_eq!(hello, Message::Hello);
    write_message(&mut conn, 0, Message::Hello).await;
    let (xid, req) = read_message(&mut conn).await;
    assert_eq!(req, Message::FeaturesReq);
    write_message(&mut conn, xid, Message::FeaturesReply(features())).await;

    let dpid = timeout(Duration::from_secs(5), accept_side)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dpid, DPID);

    let switch = manager.switch(DPID).unwrap();
    assert_eq!(switch.ports().len(), 2);
    assert_eq!(switch.port(1).unwrap().name, "s1-eth1");

    // Request/reply across the real socket.
    let reply = switch.send_and_receive(7, Message::BarrierRequest).unwrap();
    assert_eq!(read_message(&mut conn).await, (7, Message::BarrierRequest));
    write_message(&mut conn, 7, Message::BarrierReply).await;
    let msg = timeout(Duration::from_secs(5), reply).await.unwrap().unwrap();
    assert_eq!((msg.dpid, msg.xid), (DPID, 7));
    assert_eq!(msg.message, Message::BarrierReply);

    // Closing the socket drops the switch from the registry.
    drop(conn);
    timeout(Duration::from_secs(5), async {
        while manager.switch(DPID).is_ok() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(matches!(
        manager.switch(DPID),
        Err(LookupError::UnknownSwitch(_))
    ));
}
