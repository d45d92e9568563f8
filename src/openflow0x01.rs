use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::bits::{bit, bytes_of_mac, mac_of_bytes, test_bit};
use crate::error::DecodeError;

/// Encoded size of an `ofp_match` structure. Fixed by the protocol; empty
/// fields still occupy their reserved bytes.
pub const OFP_MATCH_SIZE: usize = 40;

/// Encoded size of the fixed `ofp_flow_mod` fields following the header.
const FLOW_MOD_FIXED_SIZE: usize = OFP_MATCH_SIZE + 24;

/// OpenFlow 1.0 message type codes, used by headers to identify meaning of the rest of a message.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MsgCode {
    Hello,
    Error,
    EchoReq,
    EchoResp,
    Vendor,
    FeaturesReq,
    FeaturesResp,
    GetConfigReq,
    GetConfigResp,
    SetConfig,
    PacketIn,
    FlowRemoved,
    PortStatus,
    PacketOut,
    FlowMod,
    PortMod,
    StatsReq,
    StatsResp,
    BarrierReq,
    BarrierResp,
    QueueGetConfigReq,
    QueueGetConfigResp,
}

impl MsgCode {
    /// Map a wire type code onto a `MsgCode`.
    pub fn of_code(typ: u8) -> Option<MsgCode> {
        match typ {
            0 => Some(MsgCode::Hello),
            1 => Some(MsgCode::Error),
            2 => Some(MsgCode::EchoReq),
            3 => Some(MsgCode::EchoResp),
            4 => Some(MsgCode::Vendor),
            5 => Some(MsgCode::FeaturesReq),
            6 => Some(MsgCode::FeaturesResp),
            7 => Some(MsgCode::GetConfigReq),
            8 => Some(MsgCode::GetConfigResp),
            9 => Some(MsgCode::SetConfig),
            10 => Some(MsgCode::PacketIn),
            11 => Some(MsgCode::FlowRemoved),
            12 => Some(MsgCode::PortStatus),
            13 => Some(MsgCode::PacketOut),
            14 => Some(MsgCode::FlowMod),
            15 => Some(MsgCode::PortMod),
            16 => Some(MsgCode::StatsReq),
            17 => Some(MsgCode::StatsResp),
            18 => Some(MsgCode::BarrierReq),
            19 => Some(MsgCode::BarrierResp),
            20 => Some(MsgCode::QueueGetConfigReq),
            21 => Some(MsgCode::QueueGetConfigResp),
            _ => None,
        }
    }
}

/// Common API for message types implementing OpenFlow Message Codes (see `MsgCode` enum).
pub trait MessageType: Sized {
    /// Return the byte-size of a message body, excluding the OpenFlow header.
    fn size_of(msg: &Self) -> usize;
    /// Parse a body buffer into a message.
    fn parse(buf: &[u8]) -> Result<Self, DecodeError>;
    /// Marshal a message into a `u8` buffer.
    fn marshal(msg: Self, bytes: &mut Vec<u8>);
}

fn read_u8(bytes: &mut Cursor<&[u8]>, s: &'static str, f: &'static str) -> Result<u8, DecodeError> {
    bytes.read_u8().map_err(|_| DecodeError::truncated(s, f))
}

fn read_u16(
    bytes: &mut Cursor<&[u8]>,
    s: &'static str,
    f: &'static str,
) -> Result<u16, DecodeError> {
    bytes
        .read_u16::<BigEndian>()
        .map_err(|_| DecodeError::truncated(s, f))
}

fn read_u32(
    bytes: &mut Cursor<&[u8]>,
    s: &'static str,
    f: &'static str,
) -> Result<u32, DecodeError> {
    bytes
        .read_u32::<BigEndian>()
        .map_err(|_| DecodeError::truncated(s, f))
}

fn read_i32(
    bytes: &mut Cursor<&[u8]>,
    s: &'static str,
    f: &'static str,
) -> Result<i32, DecodeError> {
    bytes
        .read_i32::<BigEndian>()
        .map_err(|_| DecodeError::truncated(s, f))
}

fn read_u64(
    bytes: &mut Cursor<&[u8]>,
    s: &'static str,
    f: &'static str,
) -> Result<u64, DecodeError> {
    bytes
        .read_u64::<BigEndian>()
        .map_err(|_| DecodeError::truncated(s, f))
}

fn read_mac(
    bytes: &mut Cursor<&[u8]>,
    s: &'static str,
    f: &'static str,
) -> Result<u64, DecodeError> {
    let mut arr = [0; 6];
    bytes
        .read_exact(&mut arr)
        .map_err(|_| DecodeError::truncated(s, f))?;
    Ok(mac_of_bytes(arr))
}

/// Skip `n` pad bytes, which must be present on the wire even though their
/// content is ignored.
fn skip(bytes: &mut Cursor<&[u8]>, n: usize, s: &'static str) -> Result<(), DecodeError> {
    let remaining = bytes.get_ref().len() as u64 - bytes.position();
    if remaining < n as u64 {
        return Err(DecodeError::truncated(s, "pad"));
    }
    bytes.seek(SeekFrom::Current(n as i64)).unwrap();
    Ok(())
}

fn remaining(bytes: &Cursor<&[u8]>) -> usize {
    bytes.get_ref().len() - bytes.position() as usize
}

fn rest(bytes: &mut Cursor<&[u8]>) -> Vec<u8> {
    let mut v = vec![];
    bytes.read_to_end(&mut v).unwrap();
    v
}

fn write_padding(bytes: &mut Vec<u8>, n: usize) {
    for _ in 0..n {
        bytes.push(0);
    }
}

/// A value optionally narrowed by a wildcard mask (number of low bits ignored).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mask<T> {
    pub value: T,
    pub mask: Option<T>,
}

/// Per-field wildcard bits of an `ofp_match`. `nw_src`/`nw_dst` carry the
/// number of ignored low address bits rather than a boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Wildcards {
    in_port: bool,
    dl_vlan: bool,
    dl_src: bool,
    dl_dst: bool,
    dl_type: bool,
    nw_proto: bool,
    tp_src: bool,
    tp_dst: bool,
    nw_src: u32,
    nw_dst: u32,
    dl_vlan_pcp: bool,
    nw_tos: bool,
}

impl Wildcards {
    fn set_nw_mask(f: u32, offset: usize, v: u32) -> u32 {
        f | ((0x3f & v) << offset)
    }

    fn get_nw_mask(f: u32, offset: usize) -> u32 {
        (f >> offset) & 0x3f
    }

    fn mask_bits(m: &Option<Mask<u32>>) -> u32 {
        match m {
            None => 32,
            Some(Mask { mask: None, .. }) => 0,
            Some(Mask { mask: Some(m), .. }) => *m,
        }
    }

    fn marshal(w: Wildcards, bytes: &mut Vec<u8>) {
        let ret = bit(0, 0, w.in_port);
        let ret = bit(1, ret, w.dl_vlan);
        let ret = bit(2, ret, w.dl_src);
        let ret = bit(3, ret, w.dl_dst);
        let ret = bit(4, ret, w.dl_type);
        let ret = bit(5, ret, w.nw_proto);
        let ret = bit(6, ret, w.tp_src);
        let ret = bit(7, ret, w.tp_dst) as u32;
        let ret = Wildcards::set_nw_mask(ret, 8, w.nw_src);
        let ret = Wildcards::set_nw_mask(ret, 14, w.nw_dst);
        let ret = bit(20, ret as u64, w.dl_vlan_pcp);
        let ret = bit(21, ret, w.nw_tos) as u32;
        bytes.write_u32::<BigEndian>(ret).unwrap()
    }

    fn parse(bits: u32) -> Wildcards {
        Wildcards {
            in_port: test_bit(0, bits as u64),
            dl_vlan: test_bit(1, bits as u64),
            dl_src: test_bit(2, bits as u64),
            dl_dst: test_bit(3, bits as u64),
            dl_type: test_bit(4, bits as u64),
            nw_proto: test_bit(5, bits as u64),
            tp_src: test_bit(6, bits as u64),
            tp_dst: test_bit(7, bits as u64),
            nw_src: Wildcards::get_nw_mask(bits, 8),
            nw_dst: Wildcards::get_nw_mask(bits, 14),
            dl_vlan_pcp: test_bit(20, bits as u64),
            nw_tos: test_bit(21, bits as u64),
        }
    }
}

/// Fields to match against flows. `None` means the field is wildcarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub dl_src: Option<u64>,
    pub dl_dst: Option<u64>,
    pub dl_typ: Option<u16>,
    pub dl_vlan: Option<Option<u16>>,
    pub dl_vlan_pcp: Option<u8>,
    pub nw_src: Option<Mask<u32>>,
    pub nw_dst: Option<Mask<u32>>,
    pub nw_proto: Option<u8>,
    pub nw_tos: Option<u8>,
    pub tp_src: Option<u16>,
    pub tp_dst: Option<u16>,
    pub in_port: Option<u16>,
}

impl Pattern {
    /// A pattern that matches every packet.
    pub fn match_all() -> Pattern {
        Pattern {
            dl_src: None,
            dl_dst: None,
            dl_typ: None,
            dl_vlan: None,
            dl_vlan_pcp: None,
            nw_src: None,
            nw_dst: None,
            nw_proto: None,
            nw_tos: None,
            tp_src: None,
            tp_dst: None,
            in_port: None,
        }
    }

    fn wildcards_of_pattern(p: &Pattern) -> Wildcards {
        Wildcards {
            in_port: p.in_port.is_none(),
            dl_vlan: p.dl_vlan.is_none(),
            dl_src: p.dl_src.is_none(),
            dl_dst: p.dl_dst.is_none(),
            dl_type: p.dl_typ.is_none(),
            nw_proto: p.nw_proto.is_none(),
            tp_src: p.tp_src.is_none(),
            tp_dst: p.tp_dst.is_none(),
            nw_src: Wildcards::mask_bits(&p.nw_src),
            nw_dst: Wildcards::mask_bits(&p.nw_dst),
            dl_vlan_pcp: p.dl_vlan_pcp.is_none(),
            nw_tos: p.nw_tos.is_none(),
        }
    }

    fn parse(bytes: &mut Cursor<&[u8]>) -> Result<Pattern, DecodeError> {
        const S: &str = "match";
        let w = Wildcards::parse(read_u32(bytes, S, "wildcards")?);
        let in_port = if w.in_port {
            skip(bytes, 2, S)?;
            None
        } else {
            Some(read_u16(bytes, S, "in_port")?)
        };
        let dl_src = if w.dl_src {
            skip(bytes, 6, S)?;
            None
        } else {
            Some(read_mac(bytes, S, "dl_src")?)
        };
        let dl_dst = if w.dl_dst {
            skip(bytes, 6, S)?;
            None
        } else {
            Some(read_mac(bytes, S, "dl_dst")?)
        };
        let dl_vlan = if w.dl_vlan {
            skip(bytes, 2, S)?;
            None
        } else {
            let vlan = read_u16(bytes, S, "dl_vlan")?;
            if vlan == 0xffff {
                Some(None)
            } else {
                Some(Some(vlan))
            }
        };
        let dl_vlan_pcp = if w.dl_vlan_pcp {
            skip(bytes, 1, S)?;
            None
        } else {
            Some(read_u8(bytes, S, "dl_vlan_pcp")?)
        };
        skip(bytes, 1, S)?;
        let dl_typ = if w.dl_type {
            skip(bytes, 2, S)?;
            None
        } else {
            Some(read_u16(bytes, S, "dl_type")?)
        };
        let nw_tos = if w.nw_tos {
            skip(bytes, 1, S)?;
            None
        } else {
            Some(read_u8(bytes, S, "nw_tos")?)
        };
        let nw_proto = if w.nw_proto {
            skip(bytes, 1, S)?;
            None
        } else {
            Some(read_u8(bytes, S, "nw_proto")?)
        };
        skip(bytes, 2, S)?;
        let nw_src = Pattern::parse_nw(bytes, w.nw_src, "nw_src")?;
        let nw_dst = Pattern::parse_nw(bytes, w.nw_dst, "nw_dst")?;
        let tp_src = if w.tp_src {
            skip(bytes, 2, S)?;
            None
        } else {
            Some(read_u16(bytes, S, "tp_src")?)
        };
        let tp_dst = if w.tp_dst {
            skip(bytes, 2, S)?;
            None
        } else {
            Some(read_u16(bytes, S, "tp_dst")?)
        };
        Ok(Pattern {
            dl_src,
            dl_dst,
            dl_typ,
            dl_vlan,
            dl_vlan_pcp,
            nw_src,
            nw_dst,
            nw_proto,
            nw_tos,
            tp_src,
            tp_dst,
            in_port,
        })
    }

    fn parse_nw(
        bytes: &mut Cursor<&[u8]>,
        mask: u32,
        field: &'static str,
    ) -> Result<Option<Mask<u32>>, DecodeError> {
        if mask >= 32 {
            skip(bytes, 4, "match")?;
            Ok(None)
        } else {
            let value = read_u32(bytes, "match", field)?;
            Ok(Some(Mask {
                value,
                mask: if mask == 0 { None } else { Some(mask) },
            }))
        }
    }

    fn marshal(p: Pattern, bytes: &mut Vec<u8>) {
        let w = Pattern::wildcards_of_pattern(&p);
        Wildcards::marshal(w, bytes);
        bytes.write_u16::<BigEndian>(p.in_port.unwrap_or(0)).unwrap();
        bytes.write_all(&bytes_of_mac(p.dl_src.unwrap_or(0))).unwrap();
        bytes.write_all(&bytes_of_mac(p.dl_dst.unwrap_or(0))).unwrap();
        let vlan = match p.dl_vlan {
            Some(Some(v)) => v,
            Some(None) | None => 0xffff,
        };
        bytes.write_u16::<BigEndian>(vlan).unwrap();
        bytes.push(p.dl_vlan_pcp.unwrap_or(0));
        write_padding(bytes, 1);
        bytes.write_u16::<BigEndian>(p.dl_typ.unwrap_or(0)).unwrap();
        bytes.push(p.nw_tos.unwrap_or(0));
        bytes.push(p.nw_proto.unwrap_or(0));
        write_padding(bytes, 2);
        bytes
            .write_u32::<BigEndian>(p.nw_src.map(|m| m.value).unwrap_or(0))
            .unwrap();
        bytes
            .write_u32::<BigEndian>(p.nw_dst.map(|m| m.value).unwrap_or(0))
            .unwrap();
        bytes.write_u16::<BigEndian>(p.tp_src.unwrap_or(0)).unwrap();
        bytes.write_u16::<BigEndian>(p.tp_dst.unwrap_or(0)).unwrap();
    }
}

/// Port behavior.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PseudoPort {
    PhysicalPort(u16),
    InPort,
    Table,
    Normal,
    Flood,
    AllPorts,
    Controller(u64),
    Local,
}

#[repr(u16)]
enum OfpPort {
    OFPPMax = 0xff00,
    OFPPInPort = 0xfff8,
    OFPPTable = 0xfff9,
    OFPPNormal = 0xfffa,
    OFPPFlood = 0xfffb,
    OFPPAll = 0xfffc,
    OFPPController = 0xfffd,
    OFPPLocal = 0xfffe,
    OFPPNone = 0xffff,
}

impl PseudoPort {
    fn of_int(p: u16) -> Result<Option<PseudoPort>, DecodeError> {
        if (OfpPort::OFPPNone as u16) == p {
            Ok(None)
        } else {
            PseudoPort::make(p, 0).map(Some)
        }
    }

    fn make(p: u16, len: u64) -> Result<PseudoPort, DecodeError> {
        match p {
            p if p == (OfpPort::OFPPInPort as u16) => Ok(PseudoPort::InPort),
            p if p == (OfpPort::OFPPTable as u16) => Ok(PseudoPort::Table),
            p if p == (OfpPort::OFPPNormal as u16) => Ok(PseudoPort::Normal),
            p if p == (OfpPort::OFPPFlood as u16) => Ok(PseudoPort::Flood),
            p if p == (OfpPort::OFPPAll as u16) => Ok(PseudoPort::AllPorts),
            p if p == (OfpPort::OFPPController as u16) => Ok(PseudoPort::Controller(len)),
            p if p == (OfpPort::OFPPLocal as u16) => Ok(PseudoPort::Local),
            _ => {
                if p <= (OfpPort::OFPPMax as u16) {
                    Ok(PseudoPort::PhysicalPort(p))
                } else {
                    Err(DecodeError::unexpected("port", "port_no", p))
                }
            }
        }
    }

    fn marshal(pp: PseudoPort, bytes: &mut Vec<u8>) {
        let port = match pp {
            PseudoPort::PhysicalPort(p) => p,
            PseudoPort::InPort => OfpPort::OFPPInPort as u16,
            PseudoPort::Table => OfpPort::OFPPTable as u16,
            PseudoPort::Normal => OfpPort::OFPPNormal as u16,
            PseudoPort::Flood => OfpPort::OFPPFlood as u16,
            PseudoPort::AllPorts => OfpPort::OFPPAll as u16,
            PseudoPort::Controller(_) => OfpPort::OFPPController as u16,
            PseudoPort::Local => OfpPort::OFPPLocal as u16,
        };
        bytes.write_u16::<BigEndian>(port).unwrap()
    }
}

/// Actions associated with flows and packets.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Output(PseudoPort),
    SetDlVlan(Option<u16>),
    SetDlVlanPcp(u8),
    SetDlSrc(u64),
    SetDlDst(u64),
    SetNwSrc(u32),
    SetNwDst(u32),
    SetNwTos(u8),
    SetTpSrc(u16),
    SetTpDst(u16),
    Enqueue(PseudoPort, u32),
}

const ACTION_HEADER_SIZE: usize = 4;

#[repr(u16)]
enum OfpActionType {
    OFPATOutput,
    OFPATSetVlanVId,
    OFPATSetVlanPCP,
    OFPATStripVlan,
    OFPATSetDlSrc,
    OFPATSetDlDst,
    OFPATSetNwSrc,
    OFPATSetNwDst,
    OFPATSetNwTos,
    OFPATSetTpSrc,
    OFPATSetTpDst,
    OFPATEnqueue,
}

impl Action {
    fn type_code(a: &Action) -> OfpActionType {
        match *a {
            Action::Output(_) => OfpActionType::OFPATOutput,
            Action::SetDlVlan(None) => OfpActionType::OFPATStripVlan,
            Action::SetDlVlan(Some(_)) => OfpActionType::OFPATSetVlanVId,
            Action::SetDlVlanPcp(_) => OfpActionType::OFPATSetVlanPCP,
            Action::SetDlSrc(_) => OfpActionType::OFPATSetDlSrc,
            Action::SetDlDst(_) => OfpActionType::OFPATSetDlDst,
            Action::SetNwSrc(_) => OfpActionType::OFPATSetNwSrc,
            Action::SetNwDst(_) => OfpActionType::OFPATSetNwDst,
            Action::SetNwTos(_) => OfpActionType::OFPATSetNwTos,
            Action::SetTpSrc(_) => OfpActionType::OFPATSetTpSrc,
            Action::SetTpDst(_) => OfpActionType::OFPATSetTpDst,
            Action::Enqueue(_, _) => OfpActionType::OFPATEnqueue,
        }
    }

    fn size_of(a: &Action) -> usize {
        let body = match *a {
            Action::SetDlSrc(_) | Action::SetDlDst(_) => 12,
            Action::Enqueue(_, _) => 12,
            _ => 4,
        };
        ACTION_HEADER_SIZE + body
    }

    fn size_of_sequence(actions: &[Action]) -> usize {
        actions.iter().map(Action::size_of).sum()
    }

    /// Decode a single action, advancing by the action's own reported
    /// length so unknown trailing pad bytes are skipped, not re-read.
    fn parse(bytes: &mut Cursor<&[u8]>) -> Result<Action, DecodeError> {
        const S: &str = "action";
        let start = bytes.position();
        let action_code = read_u16(bytes, S, "type")?;
        let len = read_u16(bytes, S, "length")?;
        if (len as usize) < ACTION_HEADER_SIZE {
            return Err(DecodeError::unexpected(S, "length", len));
        }
        let action = match action_code {
            t if t == (OfpActionType::OFPATOutput as u16) => {
                let port_code = read_u16(bytes, S, "port")?;
                let max_len = read_u16(bytes, S, "max_len")?;
                Action::Output(PseudoPort::make(port_code, max_len as u64)?)
            }
            t if t == (OfpActionType::OFPATSetVlanVId as u16) => {
                let vid = read_u16(bytes, S, "vlan_vid")?;
                if vid == 0xffff {
                    Action::SetDlVlan(None)
                } else {
                    Action::SetDlVlan(Some(vid))
                }
            }
            t if t == (OfpActionType::OFPATSetVlanPCP as u16) => {
                Action::SetDlVlanPcp(read_u8(bytes, S, "vlan_pcp")?)
            }
            t if t == (OfpActionType::OFPATStripVlan as u16) => Action::SetDlVlan(None),
            t if t == (OfpActionType::OFPATSetDlSrc as u16) => {
                Action::SetDlSrc(read_mac(bytes, S, "dl_addr")?)
            }
            t if t == (OfpActionType::OFPATSetDlDst as u16) => {
                Action::SetDlDst(read_mac(bytes, S, "dl_addr")?)
            }
            t if t == (OfpActionType::OFPATSetNwSrc as u16) => {
                Action::SetNwSrc(read_u32(bytes, S, "nw_addr")?)
            }
            t if t == (OfpActionType::OFPATSetNwDst as u16) => {
                Action::SetNwDst(read_u32(bytes, S, "nw_addr")?)
            }
            t if t == (OfpActionType::OFPATSetNwTos as u16) => {
                Action::SetNwTos(read_u8(bytes, S, "nw_tos")?)
            }
            t if t == (OfpActionType::OFPATSetTpSrc as u16) => {
                Action::SetTpSrc(read_u16(bytes, S, "tp_port")?)
            }
            t if t == (OfpActionType::OFPATSetTpDst as u16) => {
                Action::SetTpDst(read_u16(bytes, S, "tp_port")?)
            }
            t if t == (OfpActionType::OFPATEnqueue as u16) => {
                let port = read_u16(bytes, S, "port")?;
                skip(bytes, 6, S)?;
                let queue_id = read_u32(bytes, S, "queue_id")?;
                Action::Enqueue(PseudoPort::make(port, 0)?, queue_id)
            }
            t => return Err(DecodeError::unexpected(S, "type", t)),
        };
        let consumed = bytes.position() - start;
        if (len as u64) < consumed {
            return Err(DecodeError::unexpected(S, "length", len));
        }
        skip(bytes, (len as u64 - consumed) as usize, S)?;
        Ok(action)
    }

    /// Decode actions until the buffer's declared extent is consumed. The
    /// sequence is delimited by the outer message's length field, not an
    /// element count.
    fn parse_sequence(bytes: &mut Cursor<&[u8]>) -> Result<Vec<Action>, DecodeError> {
        let mut actions = vec![];
        while remaining(bytes) > 0 {
            actions.push(Action::parse(bytes)?);
        }
        Ok(actions)
    }

    fn move_controller_last(acts: Vec<Action>) -> Vec<Action> {
        let (mut to_ctrl, mut not_to_ctrl): (Vec<Action>, Vec<Action>) =
            acts.into_iter().partition(|act| {
                matches!(act, Action::Output(PseudoPort::Controller(_)))
            });
        not_to_ctrl.append(&mut to_ctrl);
        not_to_ctrl
    }

    fn marshal(act: Action, bytes: &mut Vec<u8>) {
        bytes
            .write_u16::<BigEndian>(Action::type_code(&act) as u16)
            .unwrap();
        bytes
            .write_u16::<BigEndian>(Action::size_of(&act) as u16)
            .unwrap();
        match act {
            Action::Output(pp) => {
                PseudoPort::marshal(pp, bytes);
                bytes
                    .write_u16::<BigEndian>(match pp {
                        PseudoPort::Controller(w) => w as u16,
                        _ => 0,
                    })
                    .unwrap()
            }
            Action::SetDlVlan(None) => write_padding(bytes, 4),
            Action::SetDlVlan(Some(vid)) => {
                bytes.write_u16::<BigEndian>(vid).unwrap();
                write_padding(bytes, 2);
            }
            Action::SetDlVlanPcp(n) => {
                bytes.push(n);
                write_padding(bytes, 3);
            }
            Action::SetDlSrc(mac) | Action::SetDlDst(mac) => {
                bytes.write_all(&bytes_of_mac(mac)).unwrap();
                write_padding(bytes, 6);
            }
            Action::SetNwSrc(addr) | Action::SetNwDst(addr) => {
                bytes.write_u32::<BigEndian>(addr).unwrap()
            }
            Action::SetNwTos(n) => {
                bytes.push(n);
                write_padding(bytes, 3);
            }
            Action::SetTpSrc(pt) | Action::SetTpDst(pt) => {
                bytes.write_u16::<BigEndian>(pt).unwrap();
                write_padding(bytes, 2);
            }
            Action::Enqueue(pp, qid) => {
                PseudoPort::marshal(pp, bytes);
                write_padding(bytes, 6);
                bytes.write_u32::<BigEndian>(qid).unwrap();
            }
        }
    }
}

/// How long before a flow entry expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    Permanent,
    ExpiresAfter(u16),
}

impl Timeout {
    fn of_int(tm: u16) -> Timeout {
        match tm {
            0 => Timeout::Permanent,
            d => Timeout::ExpiresAfter(d),
        }
    }

    fn to_int(tm: Timeout) -> u16 {
        match tm {
            Timeout::Permanent => 0,
            Timeout::ExpiresAfter(d) => d,
        }
    }
}

/// Capabilities supported by the datapath.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub flow_stats: bool,
    pub table_stats: bool,
    pub port_stats: bool,
    pub stp: bool,
    pub ip_reasm: bool,
    pub queue_stats: bool,
    pub arp_match_ip: bool,
}

impl Capabilities {
    fn of_int(d: u32) -> Capabilities {
        Capabilities {
            flow_stats: test_bit(0, d as u64),
            table_stats: test_bit(1, d as u64),
            port_stats: test_bit(2, d as u64),
            stp: test_bit(3, d as u64),
            ip_reasm: test_bit(5, d as u64),
            queue_stats: test_bit(6, d as u64),
            arp_match_ip: test_bit(7, d as u64),
        }
    }

    fn to_int(c: &Capabilities) -> u32 {
        let d = bit(0, 0, c.flow_stats);
        let d = bit(1, d, c.table_stats);
        let d = bit(2, d, c.port_stats);
        let d = bit(3, d, c.stp);
        let d = bit(5, d, c.ip_reasm);
        let d = bit(6, d, c.queue_stats);
        bit(7, d, c.arp_match_ip) as u32
    }
}

/// Actions supported by the datapath.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedActions {
    pub output: bool,
    pub set_vlan_id: bool,
    pub set_vlan_pcp: bool,
    pub strip_vlan: bool,
    pub set_dl_src: bool,
    pub set_dl_dst: bool,
    pub set_nw_src: bool,
    pub set_nw_dst: bool,
    pub set_nw_tos: bool,
    pub set_tp_src: bool,
    pub set_tp_dst: bool,
    pub enqueue: bool,
    pub vendor: bool,
}

impl SupportedActions {
    fn of_int(d: u32) -> SupportedActions {
        SupportedActions {
            output: test_bit(0, d as u64),
            set_vlan_id: test_bit(1, d as u64),
            set_vlan_pcp: test_bit(2, d as u64),
            strip_vlan: test_bit(3, d as u64),
            set_dl_src: test_bit(4, d as u64),
            set_dl_dst: test_bit(5, d as u64),
            set_nw_src: test_bit(6, d as u64),
            set_nw_dst: test_bit(7, d as u64),
            set_nw_tos: test_bit(8, d as u64),
            set_tp_src: test_bit(9, d as u64),
            set_tp_dst: test_bit(10, d as u64),
            enqueue: test_bit(11, d as u64),
            vendor: test_bit(12, d as u64),
        }
    }

    fn to_int(a: &SupportedActions) -> u32 {
        let d = bit(0, 0, a.output);
        let d = bit(1, d, a.set_vlan_id);
        let d = bit(2, d, a.set_vlan_pcp);
        let d = bit(3, d, a.strip_vlan);
        let d = bit(4, d, a.set_dl_src);
        let d = bit(5, d, a.set_dl_dst);
        let d = bit(6, d, a.set_nw_src);
        let d = bit(7, d, a.set_nw_dst);
        let d = bit(8, d, a.set_nw_tos);
        let d = bit(9, d, a.set_tp_src);
        let d = bit(10, d, a.set_tp_dst);
        let d = bit(11, d, a.enqueue);
        bit(12, d, a.vendor) as u32
    }
}

/// Switch features, reported once in the `FeaturesReply` of the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchFeatures {
    pub datapath_id: u64,
    pub num_buffers: u32,
    pub num_tables: u8,
    pub supported_capabilities: Capabilities,
    pub supported_actions: SupportedActions,
    pub ports: Vec<PortDesc>,
}

const SWITCH_FEATURES_FIXED_SIZE: usize = 24;

impl MessageType for SwitchFeatures {
    fn size_of(sf: &SwitchFeatures) -> usize {
        SWITCH_FEATURES_FIXED_SIZE + sf.ports.len() * PORT_DESC_SIZE
    }

    fn parse(buf: &[u8]) -> Result<SwitchFeatures, DecodeError> {
        const S: &str = "features reply";
        let mut bytes = Cursor::new(buf);
        let datapath_id = read_u64(&mut bytes, S, "datapath_id")?;
        let num_buffers = read_u32(&mut bytes, S, "n_buffers")?;
        let num_tables = read_u8(&mut bytes, S, "n_tables")?;
        skip(&mut bytes, 3, S)?;
        let supported_capabilities = Capabilities::of_int(read_u32(&mut bytes, S, "capabilities")?);
        let supported_actions = SupportedActions::of_int(read_u32(&mut bytes, S, "actions")?);
        let mut ports = vec![];
        while remaining(&bytes) > 0 {
            ports.push(PortDesc::parse(&mut bytes)?);
        }
        Ok(SwitchFeatures {
            datapath_id,
            num_buffers,
            num_tables,
            supported_capabilities,
            supported_actions,
            ports,
        })
    }

    fn marshal(sf: SwitchFeatures, bytes: &mut Vec<u8>) {
        bytes.write_u64::<BigEndian>(sf.datapath_id).unwrap();
        bytes.write_u32::<BigEndian>(sf.num_buffers).unwrap();
        bytes.push(sf.num_tables);
        write_padding(bytes, 3);
        bytes
            .write_u32::<BigEndian>(Capabilities::to_int(&sf.supported_capabilities))
            .unwrap();
        bytes
            .write_u32::<BigEndian>(SupportedActions::to_int(&sf.supported_actions))
            .unwrap();
        for pd in sf.ports {
            PortDesc::marshal(pd, bytes);
        }
    }
}

/// Type of modification to perform on a flow table.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowModCmd {
    AddFlow,
    ModFlow,
    ModStrictFlow,
    DeleteFlow,
    DeleteStrictFlow,
}

impl FlowModCmd {
    fn of_int(d: u16) -> Result<FlowModCmd, DecodeError> {
        match d {
            0 => Ok(FlowModCmd::AddFlow),
            1 => Ok(FlowModCmd::ModFlow),
            2 => Ok(FlowModCmd::ModStrictFlow),
            3 => Ok(FlowModCmd::DeleteFlow),
            4 => Ok(FlowModCmd::DeleteStrictFlow),
            d => Err(DecodeError::unexpected("flow mod", "command", d)),
        }
    }

    fn is_delete(&self) -> bool {
        matches!(self, FlowModCmd::DeleteFlow | FlowModCmd::DeleteStrictFlow)
    }
}

/// Represents modifications to a flow table from the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMod {
    pub command: FlowModCmd,
    pub pattern: Pattern,
    pub priority: u16,
    pub actions: Vec<Action>,
    pub cookie: u64,
    pub idle_timeout: Timeout,
    pub hard_timeout: Timeout,
    pub notify_when_removed: bool,
    pub apply_to_packet: Option<u32>,
    pub out_port: Option<PseudoPort>,
    pub check_overlap: bool,
}

impl FlowMod {
    fn flags_to_int(check_overlap: bool, notify_when_removed: bool) -> u16 {
        (if check_overlap { 1 << 1 } else { 0 }) | (if notify_when_removed { 1 << 0 } else { 0 })
    }

    fn check_overlap_of_flags(flags: u16) -> bool {
        2 & flags != 0
    }

    fn notify_when_removed_of_flags(flags: u16) -> bool {
        1 & flags != 0
    }
}

impl MessageType for FlowMod {
    /// Delete commands carry no actions on the wire, even when the
    /// in-memory action list is populated.
    fn size_of(msg: &FlowMod) -> usize {
        if msg.command.is_delete() {
            FLOW_MOD_FIXED_SIZE
        } else {
            FLOW_MOD_FIXED_SIZE + Action::size_of_sequence(&msg.actions)
        }
    }

    fn parse(buf: &[u8]) -> Result<FlowMod, DecodeError> {
        const S: &str = "flow mod";
        let mut bytes = Cursor::new(buf);
        let pattern = Pattern::parse(&mut bytes)?;
        let cookie = read_u64(&mut bytes, S, "cookie")?;
        let command = FlowModCmd::of_int(read_u16(&mut bytes, S, "command")?)?;
        let idle = Timeout::of_int(read_u16(&mut bytes, S, "idle_timeout")?);
        let hard = Timeout::of_int(read_u16(&mut bytes, S, "hard_timeout")?);
        let prio = read_u16(&mut bytes, S, "priority")?;
        let buffer_id = read_i32(&mut bytes, S, "buffer_id")?;
        let out_port = PseudoPort::of_int(read_u16(&mut bytes, S, "out_port")?)?;
        let flags = read_u16(&mut bytes, S, "flags")?;
        let actions = Action::parse_sequence(&mut bytes)?;
        Ok(FlowMod {
            command,
            pattern,
            priority: prio,
            actions,
            cookie,
            idle_timeout: idle,
            hard_timeout: hard,
            notify_when_removed: FlowMod::notify_when_removed_of_flags(flags),
            apply_to_packet: match buffer_id {
                -1 => None,
                n => Some(n as u32),
            },
            out_port,
            check_overlap: FlowMod::check_overlap_of_flags(flags),
        })
    }

    fn marshal(fm: FlowMod, bytes: &mut Vec<u8>) {
        Pattern::marshal(fm.pattern, bytes);
        bytes.write_u64::<BigEndian>(fm.cookie).unwrap();
        bytes.write_u16::<BigEndian>(fm.command as u16).unwrap();
        bytes
            .write_u16::<BigEndian>(Timeout::to_int(fm.idle_timeout))
            .unwrap();
        bytes
            .write_u16::<BigEndian>(Timeout::to_int(fm.hard_timeout))
            .unwrap();
        bytes.write_u16::<BigEndian>(fm.priority).unwrap();
        bytes
            .write_i32::<BigEndian>(match fm.apply_to_packet {
                None => -1,
                Some(buf_id) => buf_id as i32,
            })
            .unwrap();
        match fm.out_port {
            None => bytes
                .write_u16::<BigEndian>(OfpPort::OFPPNone as u16)
                .unwrap(),
            Some(x) => PseudoPort::marshal(x, bytes),
        }
        bytes
            .write_u16::<BigEndian>(FlowMod::flags_to_int(
                fm.check_overlap,
                fm.notify_when_removed,
            ))
            .unwrap();
        if fm.command.is_delete() {
            return;
        }
        for act in Action::move_controller_last(fm.actions) {
            if let Action::Output(PseudoPort::Table) = act {
                panic!("OFPPTable not allowed in installed flow.")
            }
            Action::marshal(act, bytes)
        }
    }
}

/// The data associated with a packet received by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Buffered(u32, Vec<u8>),
    NotBuffered(Vec<u8>),
}

impl Payload {
    pub fn size_of(payload: &Payload) -> usize {
        match *payload {
            Payload::Buffered(_, ref buf) | Payload::NotBuffered(ref buf) => buf.len(),
        }
    }

    fn buffer_id(payload: &Payload) -> i32 {
        match *payload {
            Payload::Buffered(n, _) => n as i32,
            Payload::NotBuffered(_) => -1,
        }
    }

    fn marshal(payload: Payload, bytes: &mut Vec<u8>) {
        match payload {
            Payload::Buffered(_, buf) | Payload::NotBuffered(buf) => {
                bytes.write_all(&buf).unwrap()
            }
        }
    }
}

/// The reason a packet arrives at the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketInReason {
    NoMatch,
    ExplicitSend,
}

impl PacketInReason {
    fn of_int(d: u8) -> Result<PacketInReason, DecodeError> {
        match d {
            0 => Ok(PacketInReason::NoMatch),
            1 => Ok(PacketInReason::ExplicitSend),
            d => Err(DecodeError::unexpected("packet in", "reason", d)),
        }
    }
}

/// Represents packets received by the datapath and sent to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    pub input_payload: Payload,
    pub total_len: u16,
    pub port: u16,
    pub reason: PacketInReason,
}

const PACKET_IN_FIXED_SIZE: usize = 10;

impl MessageType for PacketIn {
    fn size_of(pi: &PacketIn) -> usize {
        PACKET_IN_FIXED_SIZE + Payload::size_of(&pi.input_payload)
    }

    fn parse(buf: &[u8]) -> Result<PacketIn, DecodeError> {
        const S: &str = "packet in";
        let mut bytes = Cursor::new(buf);
        let buf_id = match read_i32(&mut bytes, S, "buffer_id")? {
            -1 => None,
            n => Some(n),
        };
        let total_len = read_u16(&mut bytes, S, "total_len")?;
        let port = read_u16(&mut bytes, S, "in_port")?;
        let reason = PacketInReason::of_int(read_u8(&mut bytes, S, "reason")?)?;
        skip(&mut bytes, 1, S)?;
        let pk = rest(&mut bytes);
        let payload = match buf_id {
            None => Payload::NotBuffered(pk),
            Some(n) => Payload::Buffered(n as u32, pk),
        };
        Ok(PacketIn {
            input_payload: payload,
            total_len,
            port,
            reason,
        })
    }

    fn marshal(pi: PacketIn, bytes: &mut Vec<u8>) {
        bytes
            .write_i32::<BigEndian>(Payload::buffer_id(&pi.input_payload))
            .unwrap();
        bytes.write_u16::<BigEndian>(pi.total_len).unwrap();
        bytes.write_u16::<BigEndian>(pi.port).unwrap();
        bytes.push(pi.reason as u8);
        write_padding(bytes, 1);
        Payload::marshal(pi.input_payload, bytes);
    }
}

/// Represents packets sent from the controller out a datapath port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOut {
    pub output_payload: Payload,
    pub port_id: Option<u16>,
    pub apply_actions: Vec<Action>,
}

const PACKET_OUT_FIXED_SIZE: usize = 8;

impl MessageType for PacketOut {
    fn size_of(po: &PacketOut) -> usize {
        PACKET_OUT_FIXED_SIZE
            + Action::size_of_sequence(&po.apply_actions)
            + Payload::size_of(&po.output_payload)
    }

    fn parse(buf: &[u8]) -> Result<PacketOut, DecodeError> {
        const S: &str = "packet out";
        let mut bytes = Cursor::new(buf);
        let buf_id = match read_i32(&mut bytes, S, "buffer_id")? {
            -1 => None,
            n => Some(n),
        };
        let in_port = read_u16(&mut bytes, S, "in_port")?;
        let actions_len = read_u16(&mut bytes, S, "actions_len")?;
        if remaining(&bytes) < actions_len as usize {
            return Err(DecodeError::truncated(S, "actions"));
        }
        let pos = bytes.position() as usize;
        let mut action_bytes = Cursor::new(&buf[pos..pos + actions_len as usize]);
        let apply_actions = Action::parse_sequence(&mut action_bytes)?;
        skip(&mut bytes, actions_len as usize, S)?;
        let pk = rest(&mut bytes);
        let output_payload = match buf_id {
            None => Payload::NotBuffered(pk),
            Some(n) => Payload::Buffered(n as u32, pk),
        };
        Ok(PacketOut {
            output_payload,
            port_id: if in_port == OfpPort::OFPPNone as u16 {
                None
            } else {
                Some(in_port)
            },
            apply_actions,
        })
    }

    fn marshal(po: PacketOut, bytes: &mut Vec<u8>) {
        bytes
            .write_i32::<BigEndian>(Payload::buffer_id(&po.output_payload))
            .unwrap();
        bytes
            .write_u16::<BigEndian>(po.port_id.unwrap_or(OfpPort::OFPPNone as u16))
            .unwrap();
        bytes
            .write_u16::<BigEndian>(Action::size_of_sequence(&po.apply_actions) as u16)
            .unwrap();
        for act in po.apply_actions {
            Action::marshal(act, bytes);
        }
        Payload::marshal(po.output_payload, bytes);
    }
}

/// Why a flow was evicted from the flow table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowRemovedReason {
    IdleTimeout,
    HardTimeout,
    Delete,
}

impl FlowRemovedReason {
    fn of_int(d: u8) -> Result<FlowRemovedReason, DecodeError> {
        match d {
            0 => Ok(FlowRemovedReason::IdleTimeout),
            1 => Ok(FlowRemovedReason::HardTimeout),
            2 => Ok(FlowRemovedReason::Delete),
            d => Err(DecodeError::unexpected("flow removed", "reason", d)),
        }
    }
}

/// Notification that a flow expired or was deleted from a datapath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRemoved {
    pub pattern: Pattern,
    pub cookie: u64,
    pub priority: u16,
    pub reason: FlowRemovedReason,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub idle_timeout: Timeout,
    pub packet_count: u64,
    pub byte_count: u64,
}

const FLOW_REMOVED_FIXED_SIZE: usize = OFP_MATCH_SIZE + 40;

impl MessageType for FlowRemoved {
    fn size_of(_: &FlowRemoved) -> usize {
        FLOW_REMOVED_FIXED_SIZE
    }

    fn parse(buf: &[u8]) -> Result<FlowRemoved, DecodeError> {
        const S: &str = "flow removed";
        let mut bytes = Cursor::new(buf);
        let pattern = Pattern::parse(&mut bytes)?;
        let cookie = read_u64(&mut bytes, S, "cookie")?;
        let priority = read_u16(&mut bytes, S, "priority")?;
        let reason = FlowRemovedReason::of_int(read_u8(&mut bytes, S, "reason")?)?;
        skip(&mut bytes, 1, S)?;
        let duration_sec = read_u32(&mut bytes, S, "duration_sec")?;
        let duration_nsec = read_u32(&mut bytes, S, "duration_nsec")?;
        let idle_timeout = Timeout::of_int(read_u16(&mut bytes, S, "idle_timeout")?);
        skip(&mut bytes, 2, S)?;
        let packet_count = read_u64(&mut bytes, S, "packet_count")?;
        let byte_count = read_u64(&mut bytes, S, "byte_count")?;
        Ok(FlowRemoved {
            pattern,
            cookie,
            priority,
            reason,
            duration_sec,
            duration_nsec,
            idle_timeout,
            packet_count,
            byte_count,
        })
    }

    fn marshal(f: FlowRemoved, bytes: &mut Vec<u8>) {
        Pattern::marshal(f.pattern, bytes);
        bytes.write_u64::<BigEndian>(f.cookie).unwrap();
        bytes.write_u16::<BigEndian>(f.priority).unwrap();
        bytes.push(f.reason as u8);
        write_padding(bytes, 1);
        bytes.write_u32::<BigEndian>(f.duration_sec).unwrap();
        bytes.write_u32::<BigEndian>(f.duration_nsec).unwrap();
        bytes
            .write_u16::<BigEndian>(Timeout::to_int(f.idle_timeout))
            .unwrap();
        write_padding(bytes, 2);
        bytes.write_u64::<BigEndian>(f.packet_count).unwrap();
        bytes.write_u64::<BigEndian>(f.byte_count).unwrap();
    }
}

/// STP state of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StpState {
    Listen,
    Learn,
    Forward,
    Block,
}

impl StpState {
    fn of_int(d: u32) -> StpState {
        // Two masked bits, so every value maps onto a state.
        match (d >> 8) & 3 {
            0 => StpState::Listen,
            1 => StpState::Learn,
            2 => StpState::Forward,
            _ => StpState::Block,
        }
    }
}

/// Current state of a physical port. Not configurable by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortState {
    pub down: bool,
    pub stp_state: StpState,
}

impl PortState {
    fn to_int(s: &PortState) -> u32 {
        bit(0, ((s.stp_state as u32) << 8) as u64, s.down) as u32
    }
}

/// Features of physical ports available in a datapath.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortFeatures {
    pub f_10mbhd: bool,
    pub f_10mbfd: bool,
    pub f_100mbhd: bool,
    pub f_100mbfd: bool,
    pub f_1gbhd: bool,
    pub f_1gbfd: bool,
    pub f_10gbfd: bool,
    pub copper: bool,
    pub fiber: bool,
    pub autoneg: bool,
    pub pause: bool,
    pub pause_asym: bool,
}

impl PortFeatures {
    fn of_int(d: u32) -> PortFeatures {
        PortFeatures {
            f_10mbhd: test_bit(0, d as u64),
            f_10mbfd: test_bit(1, d as u64),
            f_100mbhd: test_bit(2, d as u64),
            f_100mbfd: test_bit(3, d as u64),
            f_1gbhd: test_bit(4, d as u64),
            f_1gbfd: test_bit(5, d as u64),
            f_10gbfd: test_bit(6, d as u64),
            copper: test_bit(7, d as u64),
            fiber: test_bit(8, d as u64),
            autoneg: test_bit(9, d as u64),
            pause: test_bit(10, d as u64),
            pause_asym: test_bit(11, d as u64),
        }
    }

    fn to_int(f: &PortFeatures) -> u32 {
        let d = bit(0, 0, f.f_10mbhd);
        let d = bit(1, d, f.f_10mbfd);
        let d = bit(2, d, f.f_100mbhd);
        let d = bit(3, d, f.f_100mbfd);
        let d = bit(4, d, f.f_1gbhd);
        let d = bit(5, d, f.f_1gbfd);
        let d = bit(6, d, f.f_10gbfd);
        let d = bit(7, d, f.copper);
        let d = bit(8, d, f.fiber);
        let d = bit(9, d, f.autoneg);
        let d = bit(10, d, f.pause);
        bit(11, d, f.pause_asym) as u32
    }
}

/// Flags to indicate behavior of the physical port.
///
/// These flags are used both to describe the current configuration of a physical port,
/// and to configure a port's behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    pub down: bool,
    pub no_stp: bool,
    pub no_recv: bool,
    pub no_recv_stp: bool,
    pub no_flood: bool,
    pub no_fwd: bool,
    pub no_packet_in: bool,
}

impl PortConfig {
    fn of_int(d: u32) -> PortConfig {
        PortConfig {
            down: test_bit(0, d as u64),
            no_stp: test_bit(1, d as u64),
            no_recv: test_bit(2, d as u64),
            no_recv_stp: test_bit(3, d as u64),
            no_flood: test_bit(4, d as u64),
            no_fwd: test_bit(5, d as u64),
            no_packet_in: test_bit(6, d as u64),
        }
    }

    fn to_int(c: &PortConfig) -> u32 {
        let d = bit(0, 0, c.down);
        let d = bit(1, d, c.no_stp);
        let d = bit(2, d, c.no_recv);
        let d = bit(3, d, c.no_recv_stp);
        let d = bit(4, d, c.no_flood);
        let d = bit(5, d, c.no_fwd);
        bit(6, d, c.no_packet_in) as u32
    }
}

/// Description of a physical port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDesc {
    pub port_no: u16,
    pub hw_addr: u64,
    pub name: String,
    pub config: PortConfig,
    pub state: PortState,
    pub curr: PortFeatures,
    pub advertised: PortFeatures,
    pub supported: PortFeatures,
    pub peer: PortFeatures,
}

/// Encoded size of an `ofp_phy_port`.
pub const PORT_DESC_SIZE: usize = 48;

const PORT_NAME_LENGTH: usize = 16;

impl PortDesc {
    fn parse(bytes: &mut Cursor<&[u8]>) -> Result<PortDesc, DecodeError> {
        const S: &str = "port description";
        let port_no = read_u16(bytes, S, "port_no")?;
        let hw_addr = read_mac(bytes, S, "hw_addr")?;
        let name = {
            let mut arr = [0; PORT_NAME_LENGTH];
            bytes
                .read_exact(&mut arr)
                .map_err(|_| DecodeError::truncated(S, "name"))?;
            let end = arr.iter().position(|b| *b == 0).unwrap_or(arr.len());
            String::from_utf8_lossy(&arr[..end]).into_owned()
        };
        let config = PortConfig::of_int(read_u32(bytes, S, "config")?);
        let state = {
            let d = read_u32(bytes, S, "state")?;
            PortState {
                down: test_bit(0, d as u64),
                stp_state: StpState::of_int(d),
            }
        };
        let curr = PortFeatures::of_int(read_u32(bytes, S, "curr")?);
        let advertised = PortFeatures::of_int(read_u32(bytes, S, "advertised")?);
        let supported = PortFeatures::of_int(read_u32(bytes, S, "supported")?);
        let peer = PortFeatures::of_int(read_u32(bytes, S, "peer")?);
        Ok(PortDesc {
            port_no,
            hw_addr,
            name,
            config,
            state,
            curr,
            advertised,
            supported,
            peer,
        })
    }

    fn marshal(pd: PortDesc, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(pd.port_no).unwrap();
        bytes.write_all(&bytes_of_mac(pd.hw_addr)).unwrap();
        let name = pd.name.as_bytes();
        let n = name.len().min(PORT_NAME_LENGTH);
        bytes.write_all(&name[..n]).unwrap();
        write_padding(bytes, PORT_NAME_LENGTH - n);
        bytes
            .write_u32::<BigEndian>(PortConfig::to_int(&pd.config))
            .unwrap();
        bytes
            .write_u32::<BigEndian>(PortState::to_int(&pd.state))
            .unwrap();
        bytes
            .write_u32::<BigEndian>(PortFeatures::to_int(&pd.curr))
            .unwrap();
        bytes
            .write_u32::<BigEndian>(PortFeatures::to_int(&pd.advertised))
            .unwrap();
        bytes
            .write_u32::<BigEndian>(PortFeatures::to_int(&pd.supported))
            .unwrap();
        bytes
            .write_u32::<BigEndian>(PortFeatures::to_int(&pd.peer))
            .unwrap();
    }
}

/// What changed about a physical port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortReason {
    PortAdd,
    PortDelete,
    PortModify,
}

impl PortReason {
    fn of_int(d: u8) -> Result<PortReason, DecodeError> {
        match d {
            0 => Ok(PortReason::PortAdd),
            1 => Ok(PortReason::PortDelete),
            2 => Ok(PortReason::PortModify),
            d => Err(DecodeError::unexpected("port status", "reason", d)),
        }
    }
}

/// A physical port has changed in the datapath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortStatus {
    pub reason: PortReason,
    pub desc: PortDesc,
}

impl MessageType for PortStatus {
    fn size_of(_: &PortStatus) -> usize {
        8 + PORT_DESC_SIZE
    }

    fn parse(buf: &[u8]) -> Result<PortStatus, DecodeError> {
        const S: &str = "port status";
        let mut bytes = Cursor::new(buf);
        let reason = PortReason::of_int(read_u8(&mut bytes, S, "reason")?)?;
        skip(&mut bytes, 7, S)?;
        let desc = PortDesc::parse(&mut bytes)?;
        Ok(PortStatus { reason, desc })
    }

    fn marshal(ps: PortStatus, bytes: &mut Vec<u8>) {
        bytes.push(ps.reason as u8);
        write_padding(bytes, 7);
        PortDesc::marshal(ps.desc, bytes);
    }
}

/// Category of an error reported by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    HelloFailed,
    BadRequest,
    BadAction,
    FlowModFailed,
    PortModFailed,
    QueueOpFailed,
}

impl ErrorType {
    fn of_int(d: u16) -> Result<ErrorType, DecodeError> {
        match d {
            0 => Ok(ErrorType::HelloFailed),
            1 => Ok(ErrorType::BadRequest),
            2 => Ok(ErrorType::BadAction),
            3 => Ok(ErrorType::FlowModFailed),
            4 => Ok(ErrorType::PortModFailed),
            5 => Ok(ErrorType::QueueOpFailed),
            d => Err(DecodeError::unexpected("error message", "type", d)),
        }
    }
}

/// An error the peer attributes to a message this controller sent. The data
/// carries at least the offending message's header, per the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMsg {
    pub error_type: ErrorType,
    pub code: u16,
    pub data: Vec<u8>,
}

impl MessageType for ErrorMsg {
    fn size_of(err: &ErrorMsg) -> usize {
        4 + err.data.len()
    }

    fn parse(buf: &[u8]) -> Result<ErrorMsg, DecodeError> {
        const S: &str = "error message";
        let mut bytes = Cursor::new(buf);
        let error_type = ErrorType::of_int(read_u16(&mut bytes, S, "type")?)?;
        let code = read_u16(&mut bytes, S, "code")?;
        let data = rest(&mut bytes);
        Ok(ErrorMsg {
            error_type,
            code,
            data,
        })
    }

    fn marshal(err: ErrorMsg, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(err.error_type as u16).unwrap();
        bytes.write_u16::<BigEndian>(err.code).unwrap();
        bytes.write_all(&err.data).unwrap();
    }
}

/// Fragmentation handling and miss-send length of a datapath.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchConfig {
    pub flags: u16,
    pub miss_send_len: u16,
}

impl MessageType for SwitchConfig {
    fn size_of(_: &SwitchConfig) -> usize {
        4
    }

    fn parse(buf: &[u8]) -> Result<SwitchConfig, DecodeError> {
        const S: &str = "switch config";
        let mut bytes = Cursor::new(buf);
        Ok(SwitchConfig {
            flags: read_u16(&mut bytes, S, "flags")?,
            miss_send_len: read_u16(&mut bytes, S, "miss_send_len")?,
        })
    }

    fn marshal(sc: SwitchConfig, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(sc.flags).unwrap();
        bytes.write_u16::<BigEndian>(sc.miss_send_len).unwrap();
    }
}

/// Vendor extension message; the body is opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vendor {
    pub vendor: u32,
    pub data: Vec<u8>,
}

impl MessageType for Vendor {
    fn size_of(v: &Vendor) -> usize {
        4 + v.data.len()
    }

    fn parse(buf: &[u8]) -> Result<Vendor, DecodeError> {
        let mut bytes = Cursor::new(buf);
        Ok(Vendor {
            vendor: read_u32(&mut bytes, "vendor", "vendor")?,
            data: rest(&mut bytes),
        })
    }

    fn marshal(v: Vendor, bytes: &mut Vec<u8>) {
        bytes.write_u32::<BigEndian>(v.vendor).unwrap();
        bytes.write_all(&v.data).unwrap();
    }
}

/// Statistics request. The typed stats bodies are not modeled by the core;
/// the body is carried verbatim behind the type/flags prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsRequest {
    pub stats_type: u16,
    pub flags: u16,
    pub body: Vec<u8>,
}

impl MessageType for StatsRequest {
    fn size_of(sr: &StatsRequest) -> usize {
        4 + sr.body.len()
    }

    fn parse(buf: &[u8]) -> Result<StatsRequest, DecodeError> {
        const S: &str = "stats request";
        let mut bytes = Cursor::new(buf);
        Ok(StatsRequest {
            stats_type: read_u16(&mut bytes, S, "type")?,
            flags: read_u16(&mut bytes, S, "flags")?,
            body: rest(&mut bytes),
        })
    }

    fn marshal(sr: StatsRequest, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(sr.stats_type).unwrap();
        bytes.write_u16::<BigEndian>(sr.flags).unwrap();
        bytes.write_all(&sr.body).unwrap();
    }
}

/// Statistics reply, body carried verbatim like `StatsRequest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsReply {
    pub stats_type: u16,
    pub flags: u16,
    pub body: Vec<u8>,
}

impl MessageType for StatsReply {
    fn size_of(sr: &StatsReply) -> usize {
        4 + sr.body.len()
    }

    fn parse(buf: &[u8]) -> Result<StatsReply, DecodeError> {
        const S: &str = "stats reply";
        let mut bytes = Cursor::new(buf);
        Ok(StatsReply {
            stats_type: read_u16(&mut bytes, S, "type")?,
            flags: read_u16(&mut bytes, S, "flags")?,
            body: rest(&mut bytes),
        })
    }

    fn marshal(sr: StatsReply, bytes: &mut Vec<u8>) {
        bytes.write_u16::<BigEndian>(sr.stats_type).unwrap();
        bytes.write_u16::<BigEndian>(sr.flags).unwrap();
        bytes.write_all(&sr.body).unwrap();
    }
}

/// Encapsulates handling of messages implementing `MessageType` trait.
pub mod message {
    use super::*;
    use crate::error::DecodeError;
    use crate::ofp_header::{OfpHeader, OFP_VERSION};
    use crate::ofp_message::OfpMessage;

    /// Abstractions of OpenFlow messages mapping to message codes.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Message {
        Hello,
        Error(ErrorMsg),
        EchoRequest(Vec<u8>),
        EchoReply(Vec<u8>),
        Vendor(Vendor),
        FeaturesReq,
        FeaturesReply(SwitchFeatures),
        GetConfigReq,
        GetConfigReply(SwitchConfig),
        SetConfig(SwitchConfig),
        PacketIn(PacketIn),
        FlowRemoved(FlowRemoved),
        PortStatus(PortStatus),
        PacketOut(PacketOut),
        FlowMod(FlowMod),
        StatsRequest(StatsRequest),
        StatsReply(StatsReply),
        BarrierRequest,
        BarrierReply,
    }

    impl Message {
        /// Map `Message` to associated OpenFlow message type code `MsgCode`.
        pub fn msg_code_of_message(msg: &Message) -> MsgCode {
            match *msg {
                Message::Hello => MsgCode::Hello,
                Message::Error(_) => MsgCode::Error,
                Message::EchoRequest(_) => MsgCode::EchoReq,
                Message::EchoReply(_) => MsgCode::EchoResp,
                Message::Vendor(_) => MsgCode::Vendor,
                Message::FeaturesReq => MsgCode::FeaturesReq,
                Message::FeaturesReply(_) => MsgCode::FeaturesResp,
                Message::GetConfigReq => MsgCode::GetConfigReq,
                Message::GetConfigReply(_) => MsgCode::GetConfigResp,
                Message::SetConfig(_) => MsgCode::SetConfig,
                Message::PacketIn(_) => MsgCode::PacketIn,
                Message::FlowRemoved(_) => MsgCode::FlowRemoved,
                Message::PortStatus(_) => MsgCode::PortStatus,
                Message::PacketOut(_) => MsgCode::PacketOut,
                Message::FlowMod(_) => MsgCode::FlowMod,
                Message::StatsRequest(_) => MsgCode::StatsReq,
                Message::StatsReply(_) => MsgCode::StatsResp,
                Message::BarrierRequest => MsgCode::BarrierReq,
                Message::BarrierReply => MsgCode::BarrierResp,
            }
        }

        /// Marshal the OpenFlow message `msg`.
        fn marshal_body(msg: Message, bytes: &mut Vec<u8>) {
            match msg {
                Message::Hello
                | Message::FeaturesReq
                | Message::GetConfigReq
                | Message::BarrierRequest
                | Message::BarrierReply => (),
                Message::Error(err) => ErrorMsg::marshal(err, bytes),
                Message::EchoRequest(buf) | Message::EchoReply(buf) => {
                    bytes.write_all(&buf).unwrap()
                }
                Message::Vendor(v) => Vendor::marshal(v, bytes),
                Message::FeaturesReply(feats) => SwitchFeatures::marshal(feats, bytes),
                Message::GetConfigReply(conf) | Message::SetConfig(conf) => {
                    SwitchConfig::marshal(conf, bytes)
                }
                Message::PacketIn(packet_in) => PacketIn::marshal(packet_in, bytes),
                Message::FlowRemoved(flow) => FlowRemoved::marshal(flow, bytes),
                Message::PortStatus(sts) => PortStatus::marshal(sts, bytes),
                Message::PacketOut(po) => PacketOut::marshal(po, bytes),
                Message::FlowMod(flow_mod) => FlowMod::marshal(flow_mod, bytes),
                Message::StatsRequest(sr) => StatsRequest::marshal(sr, bytes),
                Message::StatsReply(sr) => StatsReply::marshal(sr, bytes),
            }
        }
    }

    impl OfpMessage for Message {
        fn size_of(msg: &Message) -> usize {
            OfpHeader::size()
                + match *msg {
                    Message::Hello
                    | Message::FeaturesReq
                    | Message::GetConfigReq
                    | Message::BarrierRequest
                    | Message::BarrierReply => 0,
                    Message::Error(ref err) => ErrorMsg::size_of(err),
                    Message::EchoRequest(ref buf) | Message::EchoReply(ref buf) => buf.len(),
                    Message::Vendor(ref v) => Vendor::size_of(v),
                    Message::FeaturesReply(ref feats) => SwitchFeatures::size_of(feats),
                    Message::GetConfigReply(ref c) | Message::SetConfig(ref c) => {
                        SwitchConfig::size_of(c)
                    }
                    Message::PacketIn(ref packet_in) => PacketIn::size_of(packet_in),
                    Message::FlowRemoved(ref flow) => FlowRemoved::size_of(flow),
                    Message::PortStatus(ref ps) => PortStatus::size_of(ps),
                    Message::PacketOut(ref po) => PacketOut::size_of(po),
                    Message::FlowMod(ref flow_mod) => FlowMod::size_of(flow_mod),
                    Message::StatsRequest(ref sr) => StatsRequest::size_of(sr),
                    Message::StatsReply(ref sr) => StatsReply::size_of(sr),
                }
        }

        fn header_of(xid: u32, msg: &Message) -> OfpHeader {
            let sizeof_buf = Self::size_of(msg);
            OfpHeader::new(
                OFP_VERSION,
                Message::msg_code_of_message(msg) as u8,
                sizeof_buf as u16,
                xid,
            )
        }

        fn marshal(xid: u32, msg: Message) -> Vec<u8> {
            let hdr = Self::header_of(xid, &msg);
            let mut bytes = vec![];
            OfpHeader::marshal(&mut bytes, hdr);
            Message::marshal_body(msg, &mut bytes);
            bytes
        }

        fn parse(header: &OfpHeader, buf: &[u8]) -> Result<(u32, Message), DecodeError> {
            let typ = MsgCode::of_code(header.type_code())
                .ok_or(DecodeError::UnsupportedMessageCode(header.type_code()))?;
            let msg = match typ {
                MsgCode::Hello => Message::Hello,
                MsgCode::Error => Message::Error(ErrorMsg::parse(buf)?),
                MsgCode::EchoReq => Message::EchoRequest(buf.to_vec()),
                MsgCode::EchoResp => Message::EchoReply(buf.to_vec()),
                MsgCode::Vendor => Message::Vendor(Vendor::parse(buf)?),
                MsgCode::FeaturesReq => Message::FeaturesReq,
                MsgCode::FeaturesResp => Message::FeaturesReply(SwitchFeatures::parse(buf)?),
                MsgCode::GetConfigReq => Message::GetConfigReq,
                MsgCode::GetConfigResp => Message::GetConfigReply(SwitchConfig::parse(buf)?),
                MsgCode::SetConfig => Message::SetConfig(SwitchConfig::parse(buf)?),
                MsgCode::PacketIn => Message::PacketIn(PacketIn::parse(buf)?),
                MsgCode::FlowRemoved => Message::FlowRemoved(FlowRemoved::parse(buf)?),
                MsgCode::PortStatus => Message::PortStatus(PortStatus::parse(buf)?),
                MsgCode::PacketOut => Message::PacketOut(PacketOut::parse(buf)?),
                MsgCode::FlowMod => Message::FlowMod(FlowMod::parse(buf)?),
                MsgCode::StatsReq => Message::StatsRequest(StatsRequest::parse(buf)?),
                MsgCode::StatsResp => Message::StatsReply(StatsReply::parse(buf)?),
                MsgCode::BarrierReq => Message::BarrierRequest,
                MsgCode::BarrierResp => Message::BarrierReply,
                code => return Err(DecodeError::UnsupportedMessageCode(code as u8)),
            };
            Ok((header.xid(), msg))
        }
    }

    /// Return a `FlowMod` adding a flow parameterized by the given `priority`, `pattern`,
    /// and `actions`.
    pub fn add_flow(prio: u16, pattern: Pattern, actions: Vec<Action>) -> FlowMod {
        FlowMod {
            command: FlowModCmd::AddFlow,
            pattern,
            priority: prio,
            actions,
            cookie: 0,
            idle_timeout: Timeout::Permanent,
            hard_timeout: Timeout::Permanent,
            notify_when_removed: false,
            out_port: None,
            apply_to_packet: None,
            check_overlap: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::message::{add_flow, Message};
    use super::*;
    use crate::ofp_header::{OfpHeader, OFP_VERSION};
    use crate::ofp_message::OfpMessage;

    const TEST_XID: u32 = 0x12345678;
    const TEST_DPID: u64 = 0x00163e000001;

    fn round_trip(msg: Message) -> Message {
        let bytes = Message::marshal(TEST_XID, msg);
        let header = OfpHeader::parse(&bytes[..OfpHeader::size()]).unwrap();
        assert_eq!(header.version(), OFP_VERSION);
        assert_eq!(header.length(), bytes.len());
        let (xid, parsed) = Message::parse(&header, &bytes[OfpHeader::size()..]).unwrap();
        assert_eq!(xid, TEST_XID);
        parsed
    }

    fn port_desc(port_no: u16) -> PortDesc {
        PortDesc {
            port_no,
            hw_addr: 0xaabbccddee00 | u64::from(port_no),
            name: format!("eth{}", port_no),
            config: PortConfig {
                down: false,
                no_stp: false,
                no_recv: false,
                no_recv_stp: true,
                no_flood: false,
                no_fwd: false,
                no_packet_in: false,
            },
            state: PortState {
                down: false,
                stp_state: StpState::Forward,
            },
            curr: PortFeatures::of_int(0x0000_0fff),
            advertised: PortFeatures::of_int(0x0000_00ff),
            supported: PortFeatures::of_int(0x0000_0fff),
            peer: PortFeatures::of_int(0),
        }
    }

    fn switch_features() -> SwitchFeatures {
        SwitchFeatures {
            datapath_id: TEST_DPID,
            num_buffers: 256,
            num_tables: 2,
            supported_capabilities: Capabilities {
                flow_stats: true,
                table_stats: true,
                port_stats: true,
                stp: false,
                ip_reasm: false,
                queue_stats: false,
                arp_match_ip: true,
            },
            supported_actions: SupportedActions {
                output: true,
                set_vlan_id: true,
                set_vlan_pcp: false,
                strip_vlan: true,
                set_dl_src: true,
                set_dl_dst: true,
                set_nw_src: false,
                set_nw_dst: false,
                set_nw_tos: false,
                set_tp_src: false,
                set_tp_dst: false,
                enqueue: false,
                vendor: false,
            },
            ports: vec![port_desc(1), port_desc(2)],
        }
    }

    fn pattern() -> Pattern {
        Pattern {
            dl_src: Some(0x001122334455),
            dl_dst: None,
            dl_typ: Some(0x0800),
            dl_vlan: Some(Some(42)),
            dl_vlan_pcp: None,
            nw_src: Some(Mask {
                value: 0x0a000001,
                mask: Some(8),
            }),
            nw_dst: Some(Mask {
                value: 0x0a000002,
                mask: None,
            }),
            nw_proto: Some(6),
            nw_tos: None,
            tp_src: Some(3000),
            tp_dst: Some(4000),
            in_port: Some(1),
        }
    }

    fn flow_mod() -> FlowMod {
        FlowMod {
            command: FlowModCmd::AddFlow,
            pattern: pattern(),
            priority: 16,
            actions: vec![
                Action::SetDlDst(0x1234567890ab),
                Action::Output(PseudoPort::PhysicalPort(2)),
            ],
            cookie: 0x1234567887654321,
            idle_timeout: Timeout::ExpiresAfter(180),
            hard_timeout: Timeout::Permanent,
            notify_when_removed: true,
            apply_to_packet: None,
            out_port: None,
            check_overlap: true,
        }
    }

    #[test]
    fn hello_round_trip() {
        assert_eq!(round_trip(Message::Hello), Message::Hello);
        let bytes = Message::marshal(0, Message::Hello);
        assert_eq!(bytes.len(), OfpHeader::size());
    }

    #[test]
    fn echo_round_trip() {
        let msg = Message::EchoRequest(vec![0xab; 5]);
        assert_eq!(round_trip(msg.clone()), msg);
        let msg = Message::EchoReply(vec![]);
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn error_round_trip() {
        let msg = Message::Error(ErrorMsg {
            error_type: ErrorType::BadRequest,
            code: 2,
            data: vec![1, 2, 3, 4, 5, 6, 7, 8],
        });
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn vendor_round_trip() {
        let msg = Message::Vendor(Vendor {
            vendor: 0x2320,
            data: vec![9, 9, 9],
        });
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn features_reply_round_trip() {
        let msg = Message::FeaturesReply(switch_features());
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn switch_config_round_trip() {
        let conf = SwitchConfig {
            flags: 0,
            miss_send_len: 128,
        };
        let msg = Message::GetConfigReply(conf);
        assert_eq!(round_trip(msg.clone()), msg);
        let msg = Message::SetConfig(conf);
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn packet_in_round_trip() {
        let msg = Message::PacketIn(PacketIn {
            input_payload: Payload::Buffered(77, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]),
            total_len: 10,
            port: 1,
            reason: PacketInReason::NoMatch,
        });
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn packet_out_round_trip() {
        let msg = Message::PacketOut(PacketOut {
            output_payload: Payload::NotBuffered(vec![1, 2, 3, 4]),
            port_id: Some(1),
            apply_actions: vec![Action::Output(PseudoPort::AllPorts)],
        });
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn flow_removed_round_trip() {
        let msg = Message::FlowRemoved(FlowRemoved {
            pattern: pattern(),
            cookie: 0x1234567887654321,
            priority: 22,
            reason: FlowRemovedReason::IdleTimeout,
            duration_sec: 123,
            duration_nsec: 123456,
            idle_timeout: Timeout::ExpiresAfter(60),
            packet_count: 100,
            byte_count: 120500,
        });
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn flow_removed_length() {
        let msg = Message::FlowRemoved(FlowRemoved {
            pattern: Pattern::match_all(),
            cookie: 0,
            priority: 0,
            reason: FlowRemovedReason::Delete,
            duration_sec: 0,
            duration_nsec: 0,
            idle_timeout: Timeout::Permanent,
            packet_count: 0,
            byte_count: 0,
        });
        // Header + Match + 40 fixed trailer bytes.
        assert_eq!(Message::marshal(0, msg).len(), 8 + 40 + 40);
    }

    #[test]
    fn port_status_round_trip() {
        let msg = Message::PortStatus(PortStatus {
            reason: PortReason::PortAdd,
            desc: port_desc(3),
        });
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn stats_round_trip() {
        let msg = Message::StatsRequest(StatsRequest {
            stats_type: 4,
            flags: 0,
            body: vec![0xff, 0xff, 0, 0, 0, 0, 0, 0],
        });
        assert_eq!(round_trip(msg.clone()), msg);
        let msg = Message::StatsReply(StatsReply {
            stats_type: 4,
            flags: 0,
            body: vec![0; 104],
        });
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn barrier_round_trip() {
        assert_eq!(round_trip(Message::BarrierRequest), Message::BarrierRequest);
        assert_eq!(round_trip(Message::BarrierReply), Message::BarrierReply);
    }

    #[test]
    fn flow_mod_round_trip() {
        let msg = Message::FlowMod(flow_mod());
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn flow_mod_with_no_actions_round_trips() {
        let mut fm = flow_mod();
        fm.actions = vec![];
        let msg = Message::FlowMod(fm);
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn flow_mod_header_length_matches_bytes() {
        let bytes = Message::marshal(TEST_XID, Message::FlowMod(flow_mod()));
        let header = OfpHeader::parse(&bytes).unwrap();
        assert_eq!(header.length(), bytes.len());
        // 72-byte fixed prefix plus one 16-byte and one 8-byte action.
        assert_eq!(bytes.len(), 72 + 16 + 8);
    }

    #[test]
    fn delete_flow_mod_omits_actions() {
        let mut fm = flow_mod();
        fm.command = FlowModCmd::DeleteFlow;
        let bytes = Message::marshal(TEST_XID, Message::FlowMod(fm));
        let header = OfpHeader::parse(&bytes).unwrap();
        assert_eq!(bytes.len(), 72);
        assert_eq!(header.length(), 72);
        let (_, parsed) = Message::parse(&header, &bytes[8..]).unwrap();
        match parsed {
            Message::FlowMod(fm) => {
                assert_eq!(fm.command, FlowModCmd::DeleteFlow);
                assert!(fm.actions.is_empty());
            }
            other => panic!("expected FlowMod, got {:?}", other),
        }
    }

    #[test]
    fn match_occupies_forty_bytes_when_empty() {
        let mut bytes = vec![];
        Pattern::marshal(Pattern::match_all(), &mut bytes);
        assert_eq!(bytes.len(), OFP_MATCH_SIZE);
    }

    #[test]
    fn add_flow_helper_round_trips() {
        let fm = add_flow(
            10,
            Pattern::match_all(),
            vec![Action::Output(PseudoPort::PhysicalPort(7))],
        );
        let msg = Message::FlowMod(fm);
        assert_eq!(round_trip(msg.clone()), msg);
    }

    #[test]
    fn truncated_flow_mod_is_an_error() {
        let bytes = Message::marshal(TEST_XID, Message::FlowMod(flow_mod()));
        let header = OfpHeader::parse(&bytes).unwrap();
        let err = Message::parse(&header, &bytes[8..40]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }

    #[test]
    fn unknown_message_code_is_an_error() {
        let header = OfpHeader::new(OFP_VERSION, 99, 8, 0);
        let err = Message::parse(&header, &[]).unwrap_err();
        assert_eq!(err, DecodeError::UnsupportedMessageCode(99));
    }

    #[test]
    fn unknown_action_type_is_an_error() {
        let mut bytes = Message::marshal(TEST_XID, Message::FlowMod(flow_mod()));
        // Corrupt the type code of the first action record.
        bytes[73] = 0x7f;
        let header = OfpHeader::parse(&bytes).unwrap();
        let err = Message::parse(&header, &bytes[8..]).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedValue { .. }));
    }

    #[test]
    fn actions_advance_by_reported_length() {
        // An output action padded out to 16 bytes must still decode and the
        // following action must be found at the reported offset.
        let mut body = vec![];
        Pattern::marshal(Pattern::match_all(), &mut body);
        body.extend_from_slice(&[0; 24]);
        body.extend_from_slice(&[0, 0, 0, 16, 0, 2, 0, 0]);
        body.extend_from_slice(&[0; 8]);
        body.extend_from_slice(&[0, 0, 0, 8, 0, 3, 0, 0]);
        let fm = FlowMod::parse(&body).unwrap();
        assert_eq!(
            fm.actions,
            vec![
                Action::Output(PseudoPort::PhysicalPort(2)),
                Action::Output(PseudoPort::PhysicalPort(3)),
            ]
        );
    }
}
