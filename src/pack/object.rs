use gix_object::Kind;

use super::chain::Chain;
use crate::error::Result;
use crate::objects::{GitObject, ObjectFormat};

/// An object resolved from a pack but not yet unpacked.
#[derive(Debug, Clone)]
pub struct Object {
    kind: Kind,
    chain: Chain,
}

impl Object {
    pub(crate) fn new(chain: Chain) -> Self {
        Object {
            kind: chain.kind(),
            chain,
        }
    }

    /// Kind of the object, taken from the whole object at the bottom of its
    /// delta chain.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn into_chain(self) -> Chain {
        self.chain
    }

    /// Inflate and apply every delta hop, returning the object's contents.
    pub fn unpack(&self) -> Result<Vec<u8>> {
        self.chain.unpack()
    }

    /// Unpack and compute the object's name in `format`.
    pub fn to_git_object(&self, format: ObjectFormat) -> Result<GitObject> {
        let data = self.unpack()?;
        Ok(GitObject::from_raw(format, self.kind, data))
    }
}
