//! A minimal collective-communication fabric for the distributed solver
//! drivers: fixed-size broadcast, integer all-reduce with MIN and MAX, and a
//! barrier, over plain TCP on the loopback or a LAN.
//!
//! Topology is a star through rank 0. Every rank must issue the same
//! sequence of collective calls; the streams carry no framing beyond the
//! fixed sizes the callers agree on, exactly like the message-passing
//! runtimes this replaces. Peers can be separate processes or threads in
//! one process; the fabric only sees sockets.

#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

use log::{debug, info};

/// The accepting side of fabric construction, held by rank 0 while worker
/// peers are being launched.
pub struct FabricHost {
    listener: TcpListener,
    size: usize,
}

impl FabricHost {
    /// Bind a loopback listener for a fabric of `size` ranks (including
    /// rank 0). `size == 1` yields a degenerate fabric whose collectives
    /// are all local no-ops.
    pub fn bind(size: usize) -> io::Result<FabricHost> {
        assert!(size >= 1, "a fabric needs at least one rank");
        let listener = TcpListener::bind("127.0.0.1:0")?;
        Ok(FabricHost { listener, size })
    }

    /// The address worker peers should [`Fabric::join`].
    pub fn addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Block until all `size - 1` peers have joined, then return the rank-0
    /// fabric. Peers identify themselves with a rank/size handshake; a
    /// mismatched size or duplicate rank is a protocol error.
    pub fn accept(self) -> io::Result<Fabric> {
        let mut peers: Vec<Option<TcpStream>> = Vec::new();
        peers.resize_with(self.size - 1, || None);

        let mut joined = 0;
        while joined < self.size - 1 {
            let (mut stream, from) = self.listener.accept()?;
            stream.set_nodelay(true)?;
            let rank = read_u32(&mut stream)? as usize;
            let size = read_u32(&mut stream)? as usize;
            if size != self.size {
                return Err(protocol_error(format!(
                    "peer joined with fabric size {size}, expected {}",
                    self.size
                )));
            }
            let slot = rank
                .checked_sub(1)
                .and_then(|i| peers.get_mut(i))
                .ok_or_else(|| protocol_error(format!("peer joined with bad rank {rank}")))?;
            if slot.replace(stream).is_some() {
                return Err(protocol_error(format!("rank {rank} joined twice")));
            }
            debug!("rank {rank} joined from {from}");
            joined += 1;
        }

        info!("fabric up with {} ranks", self.size);
        Ok(Fabric {
            rank: 0,
            size: self.size,
            link: Link::Root {
                peers: peers.into_iter().map(Option::unwrap).collect(),
            },
        })
    }
}

enum Link {
    /// Rank 0: one stream per worker peer, indexed by rank − 1.
    Root { peers: Vec<TcpStream> },
    /// Any other rank: the single stream to rank 0.
    Peer { root: TcpStream },
}

/// One rank's endpoint of the collective fabric.
pub struct Fabric {
    rank: usize,
    size: usize,
    link: Link,
}

impl Fabric {
    /// Join a host as `rank` (1-based for worker peers) in a fabric of
    /// `size` ranks.
    pub fn join(addr: SocketAddr, rank: usize, size: usize) -> io::Result<Fabric> {
        assert!(rank >= 1 && rank < size, "worker rank out of range");
        let mut root = TcpStream::connect(addr)?;
        root.set_nodelay(true)?;
        write_u32(&mut root, u32::try_from(rank).unwrap())?;
        write_u32(&mut root, u32::try_from(size).unwrap())?;
        Ok(Fabric {
            rank,
            size,
            link: Link::Peer { root },
        })
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.rank == 0
    }

    /// Broadcast `buf` from `origin` to every rank. On the origin the
    /// buffer is the message; everywhere else it is overwritten.
    pub fn broadcast(&mut self, origin: usize, buf: &mut [u8]) -> io::Result<()> {
        match &mut self.link {
            Link::Root { peers } => {
                if origin != 0 {
                    peers[origin - 1].read_exact(buf)?;
                }
                for (i, peer) in peers.iter_mut().enumerate() {
                    if i + 1 != origin {
                        peer.write_all(buf)?;
                    }
                }
            }
            Link::Peer { root } => {
                if self.rank == origin {
                    root.write_all(buf)?;
                } else {
                    root.read_exact(buf)?;
                }
            }
        }
        Ok(())
    }

    /// All-reduce with MIN: every rank contributes a value and every rank
    /// returns the smallest.
    pub fn all_reduce_min(&mut self, value: i64) -> io::Result<i64> {
        self.all_reduce(value, i64::min)
    }

    /// All-reduce with MAX.
    pub fn all_reduce_max(&mut self, value: i64) -> io::Result<i64> {
        self.all_reduce(value, i64::max)
    }

    /// Block until every rank has arrived.
    pub fn barrier(&mut self) -> io::Result<()> {
        self.all_reduce(0, i64::min).map(|_| ())
    }

    fn all_reduce(&mut self, value: i64, fold: fn(i64, i64) -> i64) -> io::Result<i64> {
        match &mut self.link {
            Link::Root { peers } => {
                let mut acc = value;
                for peer in peers.iter_mut() {
                    acc = fold(acc, read_i64(peer)?);
                }
                for peer in peers.iter_mut() {
                    peer.write_all(&acc.to_be_bytes())?;
                }
                Ok(acc)
            }
            Link::Peer { root } => {
                root.write_all(&value.to_be_bytes())?;
                read_i64(root)
            }
        }
    }
}

fn protocol_error(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn read_u32(stream: &mut TcpStream) -> io::Result<u32> {
    let mut bytes = [0u8; 4];
    stream.read_exact(&mut bytes)?;
    Ok(u32::from_be_bytes(bytes))
}

fn write_u32(stream: &mut TcpStream, value: u32) -> io::Result<()> {
    stream.write_all(&value.to_be_bytes())
}

fn read_i64(stream: &mut TcpStream) -> io::Result<i64> {
    let mut bytes = [0u8; 8];
    stream.read_exact(&mut bytes)?;
    Ok(i64::from_be_bytes(bytes))
}
