/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Follow / friend / ignore transitions between a local author and another
//! author, local or hosted on a peer node. Every transition runs in one
//! SQLite transaction so the graph never shows half of a friendship.

use rusqlite::Connection;
use uuid::Uuid;

use crate::error::{SocialError, SocialResult};
use crate::social_db::{
    delete_relation, has_relation, insert_relation, is_local_author, relation_sources, relation_targets,
    RelationKind, SocialDb,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Party {
    Local(Uuid),
    Foreign(Uuid),
}

impl Party {
    pub fn new(id: Uuid, is_local: bool) -> Self {
        if is_local {
            Party::Local(id)
        } else {
            Party::Foreign(id)
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Party::Local(id) | Party::Foreign(id) => *id,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Party::Local(_))
    }
}

/// What a profile page offers `me` to do about another author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    Friends,
    PendingRequest,
    Following,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    Pending,
    BecameFriends,
    AlreadyFriends,
    Ignored,
}

impl SocialDb {
    pub fn follow(&self, me: Uuid, other: Party) -> SocialResult<()> {
        let conn = self.conn()?;
        check_pair(&conn, me, other)?;
        insert_relation(&conn, me, other.id(), other.is_local(), RelationKind::Following)?;
        Ok(())
    }

    pub fn unfollow(&self, me: Uuid, other: Party) -> SocialResult<()> {
        let conn = self.conn()?;
        delete_relation(&conn, me, other.id(), RelationKind::Following)?;
        Ok(())
    }

    pub fn is_following(&self, me: Uuid, other: Uuid) -> SocialResult<bool> {
        let conn = self.conn()?;
        Ok(has_relation(&conn, me, other, RelationKind::Following)?)
    }

    /// Local followers that are neither friends nor ignored, then foreign
    /// requests still waiting for an answer.
    pub fn pending_friend_requests(&self, me: Uuid) -> SocialResult<Vec<Party>> {
        let conn = self.conn()?;
        let mut out = Vec::new();
        for follower in relation_sources(&conn, me, RelationKind::Following)? {
            if !is_local_author(&conn, follower)? {
                continue;
            }
            if local_request_pending(&conn, me, follower)? {
                out.push(Party::Local(follower));
            }
        }
        for (other, _) in relation_targets(&conn, me, RelationKind::PendingIncoming)? {
            out.push(Party::Foreign(other));
        }
        Ok(out)
    }

    pub fn pending_friend_request_count(&self, me: Uuid) -> SocialResult<u64> {
        Ok(self.pending_friend_requests(me)?.len() as u64)
    }

    pub fn accept_friend_request(&self, me: Uuid, other: Party) -> SocialResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        match other {
            Party::Local(o) => {
                if !has_relation(&tx, o, me, RelationKind::Following)?
                    || has_relation(&tx, me, o, RelationKind::Friend)?
                {
                    return Err(SocialError::NoPendingRequest(o.to_string()));
                }
                insert_relation(&tx, me, o, true, RelationKind::Following)?;
                insert_relation(&tx, me, o, true, RelationKind::Friend)?;
                insert_relation(&tx, o, me, true, RelationKind::Friend)?;
            }
            Party::Foreign(o) => {
                if delete_relation(&tx, me, o, RelationKind::PendingIncoming)? == 0 {
                    return Err(SocialError::NoPendingRequest(o.to_string()));
                }
                insert_relation(&tx, me, o, false, RelationKind::Friend)?;
                insert_relation(&tx, me, o, false, RelationKind::Following)?;
            }
        }
        delete_relation(&tx, me, other.id(), RelationKind::Ignored)?;
        tx.commit()?;
        Ok(())
    }

    pub fn decline_friend_request(&self, me: Uuid, other: Party) -> SocialResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        match other {
            Party::Local(o) => {
                if !local_request_pending(&tx, me, o)? {
                    return Err(SocialError::NoPendingRequest(o.to_string()));
                }
                insert_relation(&tx, me, o, true, RelationKind::Ignored)?;
            }
            Party::Foreign(o) => {
                if delete_relation(&tx, me, o, RelationKind::PendingIncoming)? == 0 {
                    return Err(SocialError::NoPendingRequest(o.to_string()));
                }
                insert_relation(&tx, me, o, false, RelationKind::Ignored)?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Ends a friendship. A local ex-friend keeps following `me`, so its
    /// request shows up as pending again.
    pub fn delete_friend(&self, me: Uuid, other: Party) -> SocialResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let o = other.id();
        delete_relation(&tx, me, o, RelationKind::Friend)?;
        delete_relation(&tx, me, o, RelationKind::Following)?;
        if other.is_local() {
            delete_relation(&tx, o, me, RelationKind::Friend)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn is_friend(&self, me: Uuid, other: Uuid) -> SocialResult<bool> {
        let conn = self.conn()?;
        Ok(has_relation(&conn, me, other, RelationKind::Friend)?)
    }

    /// Local friends first, then foreign ones, each in the order they were made.
    pub fn all_friends(&self, me: Uuid) -> SocialResult<Vec<Party>> {
        let conn = self.conn()?;
        let rows = relation_targets(&conn, me, RelationKind::Friend)?;
        let (local, foreign): (Vec<_>, Vec<_>) = rows.into_iter().partition(|(_, is_local)| *is_local);
        Ok(local
            .into_iter()
            .map(|(id, _)| Party::Local(id))
            .chain(foreign.into_iter().map(|(id, _)| Party::Foreign(id)))
            .collect())
    }

    pub fn all_friend_ids(&self, me: Uuid) -> SocialResult<Vec<Uuid>> {
        Ok(self.all_friends(me)?.into_iter().map(|p| p.id()).collect())
    }

    pub fn relationship(&self, me: Uuid, other: Party) -> SocialResult<Relationship> {
        let conn = self.conn()?;
        let o = other.id();
        if has_relation(&conn, me, o, RelationKind::Friend)? {
            return Ok(Relationship::Friends);
        }
        let pending = match other {
            Party::Local(_) => local_request_pending(&conn, me, o)?,
            Party::Foreign(_) => has_relation(&conn, me, o, RelationKind::PendingIncoming)?,
        };
        if pending {
            return Ok(Relationship::PendingRequest);
        }
        if has_relation(&conn, me, o, RelationKind::Following)? {
            return Ok(Relationship::Following);
        }
        Ok(Relationship::None)
    }

    /// Everyone reachable through one local friend, excluding `me`.
    pub fn friends_of_friends(&self, me: Uuid) -> SocialResult<Vec<Uuid>> {
        let conn = self.conn()?;
        let mut out: Vec<Uuid> = Vec::new();
        for (friend, is_local) in relation_targets(&conn, me, RelationKind::Friend)? {
            if !is_local {
                continue;
            }
            for (fof, _) in relation_targets(&conn, friend, RelationKind::Friend)? {
                if fof != me && !out.contains(&fof) {
                    out.push(fof);
                }
            }
        }
        Ok(out)
    }

    /// A local author asks another local author for friendship by following it.
    pub fn receive_local_friend_request(&self, receiver: Uuid, sender: Uuid) -> SocialResult<()> {
        self.follow(sender, Party::Local(receiver))
    }

    /// A foreign author asks a local author for friendship. When the local
    /// author already follows the sender the two become friends at once.
    pub fn receive_foreign_friend_request(&self, receiver: Uuid, sender: Uuid) -> SocialResult<InboundOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        check_pair(&tx, receiver, Party::Foreign(sender))?;
        let outcome = if has_relation(&tx, receiver, sender, RelationKind::Friend)? {
            InboundOutcome::AlreadyFriends
        } else if has_relation(&tx, receiver, sender, RelationKind::Following)? {
            delete_relation(&tx, receiver, sender, RelationKind::PendingIncoming)?;
            delete_relation(&tx, receiver, sender, RelationKind::Ignored)?;
            insert_relation(&tx, receiver, sender, false, RelationKind::Friend)?;
            InboundOutcome::BecameFriends
        } else if has_relation(&tx, receiver, sender, RelationKind::Ignored)? {
            InboundOutcome::Ignored
        } else {
            insert_relation(&tx, receiver, sender, false, RelationKind::PendingIncoming)?;
            InboundOutcome::Pending
        };
        tx.commit()?;
        Ok(outcome)
    }
}

fn check_pair(conn: &Connection, me: Uuid, other: Party) -> SocialResult<()> {
    if me == other.id() {
        return Err(SocialError::SelfRelation);
    }
    if !is_local_author(conn, me)? {
        return Err(SocialError::NotFound("author"));
    }
    if let Party::Local(o) = other {
        if !is_local_author(conn, o)? {
            return Err(SocialError::NotFound("author"));
        }
    }
    Ok(())
}

fn local_request_pending(conn: &Connection, me: Uuid, other: Uuid) -> SocialResult<bool> {
    Ok(has_relation(conn, other, me, RelationKind::Following)?
        && !has_relation(conn, me, other, RelationKind::Friend)?
        && !has_relation(conn, me, other, RelationKind::Ignored)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social_db::tests::{make_author, temp_db};

    #[test]
    fn follow_then_accept_makes_symmetric_friends() {
        let (_dir, db) = temp_db();
        let a = make_author(&db, "user1");
        let b = make_author(&db, "user2");

        db.follow(a.id, Party::Local(b.id)).unwrap();
        assert_eq!(db.pending_friend_requests(b.id).unwrap(), vec![Party::Local(a.id)]);
        assert_eq!(db.relationship(b.id, Party::Local(a.id)).unwrap(), Relationship::PendingRequest);
        assert_eq!(db.relationship(a.id, Party::Local(b.id)).unwrap(), Relationship::Following);

        db.accept_friend_request(b.id, Party::Local(a.id)).unwrap();
        assert!(db.is_friend(a.id, b.id).unwrap());
        assert!(db.is_friend(b.id, a.id).unwrap());
        assert!(db.is_following(b.id, a.id).unwrap());
        assert_eq!(db.pending_friend_request_count(b.id).unwrap(), 0);
        assert_eq!(db.relationship(a.id, Party::Local(b.id)).unwrap(), Relationship::Friends);
    }

    #[test]
    fn accepting_without_request_fails() {
        let (_dir, db) = temp_db();
        let a = make_author(&db, "user1");
        let b = make_author(&db, "user2");
        let err = db.accept_friend_request(b.id, Party::Local(a.id)).unwrap_err();
        assert!(matches!(err, SocialError::NoPendingRequest(_)));
        let err = db.decline_friend_request(b.id, Party::Foreign(Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, SocialError::NoPendingRequest(_)));
    }

    #[test]
    fn cannot_follow_self() {
        let (_dir, db) = temp_db();
        let a = make_author(&db, "user1");
        assert!(matches!(db.follow(a.id, Party::Local(a.id)), Err(SocialError::SelfRelation)));
    }

    #[test]
    fn declined_request_is_hidden() {
        let (_dir, db) = temp_db();
        let a = make_author(&db, "user1");
        let b = make_author(&db, "user2");
        db.follow(a.id, Party::Local(b.id)).unwrap();
        db.decline_friend_request(b.id, Party::Local(a.id)).unwrap();
        assert!(db.pending_friend_requests(b.id).unwrap().is_empty());
        assert!(db.is_following(a.id, b.id).unwrap());
        assert_eq!(db.relationship(b.id, Party::Local(a.id)).unwrap(), Relationship::None);
    }

    #[test]
    fn unfriend_leaves_the_other_following() {
        let (_dir, db) = temp_db();
        let a = make_author(&db, "user1");
        let b = make_author(&db, "user2");
        db.follow(a.id, Party::Local(b.id)).unwrap();
        db.accept_friend_request(b.id, Party::Local(a.id)).unwrap();

        db.delete_friend(b.id, Party::Local(a.id)).unwrap();
        assert!(!db.is_friend(a.id, b.id).unwrap());
        assert!(!db.is_friend(b.id, a.id).unwrap());
        assert!(!db.is_following(b.id, a.id).unwrap());
        assert!(db.is_following(a.id, b.id).unwrap());
        assert_eq!(db.pending_friend_requests(b.id).unwrap(), vec![Party::Local(a.id)]);
    }

    #[test]
    fn foreign_request_is_pending_until_accepted() {
        let (_dir, db) = temp_db();
        let a = make_author(&db, "user1");
        let foreign = Uuid::new_v4();

        assert_eq!(db.receive_foreign_friend_request(a.id, foreign).unwrap(), InboundOutcome::Pending);
        assert_eq!(db.receive_foreign_friend_request(a.id, foreign).unwrap(), InboundOutcome::Pending);
        assert_eq!(db.pending_friend_request_count(a.id).unwrap(), 1);

        db.accept_friend_request(a.id, Party::Foreign(foreign)).unwrap();
        assert!(db.is_friend(a.id, foreign).unwrap());
        assert!(db.is_following(a.id, foreign).unwrap());
        assert_eq!(db.pending_friend_request_count(a.id).unwrap(), 0);
        assert_eq!(
            db.receive_foreign_friend_request(a.id, foreign).unwrap(),
            InboundOutcome::AlreadyFriends
        );
    }

    #[test]
    fn foreign_request_from_followed_author_reconciles() {
        let (_dir, db) = temp_db();
        let a = make_author(&db, "user1");
        let foreign = Uuid::new_v4();
        db.follow(a.id, Party::Foreign(foreign)).unwrap();
        assert_eq!(
            db.receive_foreign_friend_request(a.id, foreign).unwrap(),
            InboundOutcome::BecameFriends
        );
        assert!(db.is_friend(a.id, foreign).unwrap());
        assert_eq!(db.pending_friend_request_count(a.id).unwrap(), 0);
    }

    #[test]
    fn friends_list_puts_locals_first() {
        let (_dir, db) = temp_db();
        let a = make_author(&db, "user1");
        let b = make_author(&db, "user2");
        let foreign = Uuid::new_v4();
        db.receive_foreign_friend_request(a.id, foreign).unwrap();
        db.accept_friend_request(a.id, Party::Foreign(foreign)).unwrap();
        db.follow(b.id, Party::Local(a.id)).unwrap();
        db.accept_friend_request(a.id, Party::Local(b.id)).unwrap();
        assert_eq!(db.all_friend_ids(a.id).unwrap(), vec![b.id, foreign]);
    }

    #[test]
    fn friends_of_friends_go_through_local_friends() {
        let (_dir, db) = temp_db();
        let a = make_author(&db, "user1");
        let b = make_author(&db, "user2");
        let c = make_author(&db, "user3");
        db.follow(b.id, Party::Local(a.id)).unwrap();
        db.accept_friend_request(a.id, Party::Local(b.id)).unwrap();
        db.follow(c.id, Party::Local(b.id)).unwrap();
        db.accept_friend_request(b.id, Party::Local(c.id)).unwrap();
        assert_eq!(db.friends_of_friends(a.id).unwrap(), vec![c.id]);
        assert!(db.friends_of_friends(c.id).unwrap().contains(&a.id));
    }
}
