use std::fmt;
use std::net::IpAddr;
use serde::Serialize;

#[derive(Copy, Clone, Debug, Serialize, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct Addr {
    pub addr: IpAddr,
    pub port: u16,
}

#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct Tuple {
    pub src: Addr,
    pub dst: Addr,
}

#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct Key(Addr, Addr);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Original,
    Reverse,
}

#[derive(Clone, Debug, Serialize, Eq, PartialEq)]
pub struct Endpoint {
    pub ip:   String,
    pub port: u16,
}

impl Tuple {
    pub fn key(&self) -> Key {
        match self.src <= self.dst {
            true  => Key(self.src, self.dst),
            false => Key(self.dst, self.src),
        }
    }

    pub fn reverse(&self) -> Tuple {
        Tuple {
            src: self.dst,
            dst: self.src,
        }
    }
}

impl Direction {
    pub fn index(self) -> usize {
        match self {
            Direction::Original => 0,
            Direction::Reverse  => 1,
        }
    }
}

impl From<Addr> for Endpoint {
    fn from(addr: Addr) -> Self {
        Self {
            ip:   addr.addr.to_string(),
            port: addr.port,
        }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}
