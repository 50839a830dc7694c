use crossbeam_channel::{Receiver, Sender};
use log::debug;
use super::comm::Communicator;




/// A communicator whose ranks are threads of one process, connected by one
/// crossbeam channel per ordered pair of ranks. It gives each rank a view of
/// the collective operations identical to a distributed run, which makes it
/// useful for checking that ranks agree.
///
pub struct ChannelCommunicator {
    rank: usize,
    outbound: Vec<Sender<Vec<u8>>>,
    inbound: Vec<Receiver<Vec<u8>>>,
}

impl ChannelCommunicator {
    /// Create a fully connected group of `size` communicators. Element `r`
    /// of the returned vector has rank `r`; each is meant to be moved into
    /// its own thread.
    ///
    pub fn group(size: usize) -> Vec<Self> {
        assert!(size > 0, "a communicator group needs at least one rank");

        let mut senders: Vec<Vec<Sender<Vec<u8>>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut receivers: Vec<Vec<Receiver<Vec<u8>>>> = (0..size).map(|_| Vec::with_capacity(size)).collect();

        for src in 0..size {
            for dst in 0..size {
                let (s, r) = crossbeam_channel::unbounded();
                senders[src].push(s);
                receivers[dst].push(r);
            }
        }
        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (outbound, inbound))| Self { rank, outbound, inbound })
            .collect()
    }
}

impl Communicator for ChannelCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.outbound.len()
    }

    fn send(&self, rank: usize, message: Vec<u8>) {
        debug!("rank {} sends {} bytes to rank {}", self.rank, message.len(), rank);
        self.outbound[rank]
            .send(message)
            .unwrap_or_else(|_| panic!("rank {} hung up before rank {} could send to it", rank, self.rank))
    }

    fn recv(&self, rank: usize) -> Vec<u8> {
        self.inbound[rank]
            .recv()
            .unwrap_or_else(|_| panic!("rank {} hung up before rank {} could receive from it", rank, self.rank))
    }
}
