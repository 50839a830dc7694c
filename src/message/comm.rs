use super::util;

/// Interface for a group of processes that can exchange messages. Every rank
/// runs the same program; collective operations must be entered by all ranks
/// in the same order. The underlying transport can in principle be
/// in-process channels, TCP, or a higher level abstraction like MPI.
///
pub trait Communicator {
    /// Must be implemented to return the rank of this process within the
    /// communicator.
    fn rank(&self) -> usize;

    /// Must be implemented to return the number of peers processes in this
    /// communicator.
    fn size(&self) -> usize;

    /// Must be implemented to send a message to a peer. This method must
    /// return immediately, in other words it is not allowed to block until a
    /// matching receive is posted.
    fn send(&self, rank: usize, message: Vec<u8>);

    /// Must be implemented to receive the next message from the given peer.
    /// Messages between a pair of ranks arrive in the order they were sent.
    /// This method is allowed to block until a message is ready.
    fn recv(&self, rank: usize) -> Vec<u8>;

    /// Implements a binomial tree broadcast from rank 0. The message buffer
    /// must be `Some` if this is the root node, and it must be `None`
    /// otherwise.
    ///
    fn broadcast(&self, value: Option<Vec<u8>>) -> Vec<u8> {
        let r = self.rank();
        let p = self.size();

        let value = match value {
            Some(value) => value,
            None => {
                assert!(r != 0, "the broadcast root must supply the message");
                self.recv(r & (r - 1))
            }
        };
        for level in (0..util::ceil_log2(p)).rev() {
            let one = 1 << level;
            let two = 1 << (level + 1);

            if r % two == 0 && r + one < p {
                self.send(r + one, value.clone())
            }
        }
        value
    }

    /// Implements a binomial tree reduce to rank 0. All ranks return `None`
    /// except for the root.
    ///
    fn reduce<F>(&self, f: F, mut value: Vec<u8>) -> Option<Vec<u8>>
    where
        F: Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
    {
        let r = self.rank();
        let p = self.size();

        for level in 0..util::ceil_log2(p) {
            let one = 1 << level;
            let two = 1 << (level + 1);

            if r % two == 0 {
                if r + one < p {
                    value = f(value, self.recv(r + one))
                }
            } else {
                self.send(r - one, value);
                return None;
            }
        }
        Some(value)
    }

    /// Implements an all-reduce (symmetric fold) operation over a commutative
    /// binary operator. Every rank returns the same bytes.
    ///
    fn all_reduce<F>(&self, f: F, value: Vec<u8>) -> Vec<u8>
    where
        F: Fn(Vec<u8>, Vec<u8>) -> Vec<u8>,
    {
        self.broadcast(self.reduce(f, value))
    }
}




/// The communicator of a program running on one rank. Collectives return
/// their input.
///
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleRank;

impl Communicator for SingleRank {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, rank: usize, _message: Vec<u8>) {
        panic!("single-rank communicator cannot send to rank {}", rank)
    }

    fn recv(&self, rank: usize) -> Vec<u8> {
        panic!("single-rank communicator cannot receive from rank {}", rank)
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{Communicator, SingleRank};

    #[test]
    fn single_rank_collectives_are_identity() {
        let comm = SingleRank;
        assert_eq!(comm.all_reduce(|a, _| a, vec![1, 2, 3]), vec![1, 2, 3]);
        assert_eq!(comm.broadcast(Some(vec![7])), vec![7]);
        assert_eq!(comm.reduce(|a, _| a, vec![4]), Some(vec![4]));
    }
}
