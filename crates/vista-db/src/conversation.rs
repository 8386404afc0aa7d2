//! Conversation lifecycle as an explicit state machine.
//!
//! A conversation is either a direct pair, an active group with exactly one
//! admin who is also a member, or deleted. Each operation consumes the
//! current state and yields a [`Transition`]: the next state plus the
//! [`Effect`]s the store must apply, in order, inside one transaction.
//! Nothing here touches the database.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub user_id: String,
    pub username: String,
}

impl Member {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }
}

/// Two distinct members, no admin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectPair {
    members: [Member; 2],
}

impl DirectPair {
    pub fn new(a: Member, b: Member) -> Result<Self> {
        if a.user_id == b.user_id {
            return Err(Error::InvalidParticipants);
        }
        Ok(Self { members: [a, b] })
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn user_ids(&self) -> (&str, &str) {
        (&self.members[0].user_id, &self.members[1].user_id)
    }
}

/// Members in join order. The admin is always one of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    admin: Member,
    members: Vec<Member>,
}

impl Group {
    /// A fresh group: the admin joins first, then `others` in order.
    /// Duplicates and the admin's own entry in `others` are dropped.
    pub fn new(admin: Member, others: impl IntoIterator<Item = Member>) -> Self {
        let mut group = Self {
            members: vec![admin.clone()],
            admin,
        };
        for member in others {
            if !group.is_member(&member.user_id) {
                group.members.push(member);
            }
        }
        group
    }

    /// Rebuild a stored group. Fails if the admin is not among `members`.
    pub fn from_parts(admin_id: &str, members: Vec<Member>) -> Result<Self> {
        let admin = members
            .iter()
            .find(|m| m.user_id == admin_id)
            .cloned()
            .ok_or_else(|| Error::Invalid("group admin is not a member".into()))?;
        Ok(Self { admin, members })
    }

    pub fn admin(&self) -> &Member {
        &self.admin
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m.user_id == user_id)
    }

    fn is_admin(&self, user_id: &str) -> bool {
        self.admin.user_id == user_id
    }

    fn without(mut self, user_id: &str) -> Self {
        self.members.retain(|m| m.user_id != user_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationState {
    Direct(DirectPair),
    GroupActive(Group),
    Deleted,
}

/// A change the store applies to persist a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    AddMember(Member),
    RemoveMember(String),
    SetAdmin(String),
    SystemMessage { sender_id: String, text: String },
    DeleteConversation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: ConversationState,
    pub effects: Vec<Effect>,
}

impl Transition {
    /// Members this transition adds, in order.
    pub fn added(&self) -> impl Iterator<Item = &Member> {
        self.effects.iter().filter_map(|e| match e {
            Effect::AddMember(m) => Some(m),
            _ => None,
        })
    }
}

impl ConversationState {
    /// Shape a new conversation from the requester plus resolved targets.
    /// Two distinct people make a direct pair; more make a group that the
    /// requester administers.
    pub fn from_participants(requester: Member, targets: Vec<Member>) -> Result<Self> {
        let group = Group::new(requester, targets);
        match group.members.len() {
            0 | 1 => Err(Error::InvalidParticipants),
            2 => {
                let mut members = group.members.into_iter();
                match (members.next(), members.next()) {
                    (Some(a), Some(b)) => Ok(Self::Direct(DirectPair::new(a, b)?)),
                    _ => Err(Error::InvalidParticipants),
                }
            }
            _ => Ok(Self::GroupActive(group)),
        }
    }

    /// Rebuild from stored columns, rejecting rows that break the invariants.
    pub fn load(is_group: bool, admin_id: Option<&str>, members: Vec<Member>) -> Result<Self> {
        if is_group {
            let admin_id =
                admin_id.ok_or_else(|| Error::Invalid("group has no admin".into()))?;
            return Ok(Self::GroupActive(Group::from_parts(admin_id, members)?));
        }

        if admin_id.is_some() {
            return Err(Error::Invalid("direct conversation has an admin".into()));
        }
        let mut members = members.into_iter();
        match (members.next(), members.next(), members.next()) {
            (Some(a), Some(b), None) => Ok(Self::Direct(DirectPair::new(a, b)?)),
            _ => Err(Error::Invalid(
                "direct conversation must have exactly two members".into(),
            )),
        }
    }

    pub fn members(&self) -> &[Member] {
        match self {
            Self::Direct(pair) => pair.members(),
            Self::GroupActive(group) => group.members(),
            Self::Deleted => &[],
        }
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.members().iter().any(|m| m.user_id == user_id)
    }

    pub fn admin(&self) -> Option<&Member> {
        match self {
            Self::GroupActive(group) => Some(group.admin()),
            _ => None,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::GroupActive(_))
    }

    /// Admin-only operations need an active group administered by `actor_id`.
    pub fn check_admin(&self, actor_id: &str) -> Result<()> {
        match self {
            Self::GroupActive(group) if group.is_admin(actor_id) => Ok(()),
            Self::GroupActive(_) | Self::Direct(_) => Err(Error::NotAdmin),
            Self::Deleted => Err(Error::NotFound("conversation")),
        }
    }

    /// Senders must be current members.
    pub fn check_sender(&self, user_id: &str) -> Result<()> {
        match self {
            Self::Deleted => Err(Error::NotFound("conversation")),
            _ if self.is_member(user_id) => Ok(()),
            _ => Err(Error::NotAMember),
        }
    }

    pub fn remove_member(self, actor_id: &str, target: &Member) -> Result<Transition> {
        let group = self.into_admin_group(actor_id)?;
        if group.is_admin(&target.user_id) {
            return Err(Error::CannotRemoveAdmin);
        }
        if !group.is_member(&target.user_id) {
            return Err(Error::NotAMember);
        }

        Ok(Transition {
            state: Self::GroupActive(group.without(&target.user_id)),
            effects: vec![
                Effect::RemoveMember(target.user_id.clone()),
                Effect::SystemMessage {
                    sender_id: actor_id.to_string(),
                    text: format!("{} was removed from the group", target.username),
                },
            ],
        })
    }

    /// Leaving hands the admin role to the earliest-joined remaining member.
    /// The last member out deletes the group.
    pub fn leave(self, user_id: &str) -> Result<Transition> {
        let group = match self {
            Self::GroupActive(group) => group,
            Self::Direct(_) => return Err(Error::NotFound("group")),
            Self::Deleted => return Err(Error::NotFound("conversation")),
        };
        let leaver = group
            .members
            .iter()
            .find(|m| m.user_id == user_id)
            .cloned()
            .ok_or(Error::NotAMember)?;

        let mut effects = Vec::new();
        let mut remaining = group.clone().without(user_id);

        if group.is_admin(user_id) {
            let Some(successor) = remaining.members.first().cloned() else {
                return Ok(Transition {
                    state: Self::Deleted,
                    effects: vec![Effect::DeleteConversation],
                });
            };
            effects.push(Effect::SetAdmin(successor.user_id.clone()));
            remaining.admin = successor;
        }

        effects.push(Effect::RemoveMember(leaver.user_id.clone()));
        effects.push(Effect::SystemMessage {
            sender_id: leaver.user_id,
            text: format!("{} left the group", leaver.username),
        });

        Ok(Transition {
            state: Self::GroupActive(remaining),
            effects,
        })
    }

    pub fn delete(self, actor_id: &str) -> Result<Transition> {
        self.into_admin_group(actor_id)?;
        Ok(Transition {
            state: Self::Deleted,
            effects: vec![Effect::DeleteConversation],
        })
    }

    /// Current members among `candidates` are skipped. One system message
    /// names everyone added; none is written if nobody was.
    pub fn add_members(self, actor_id: &str, candidates: Vec<Member>) -> Result<Transition> {
        let mut group = self.into_admin_group(actor_id)?;

        let mut effects = Vec::new();
        let mut names = Vec::new();
        for candidate in candidates {
            if group.is_member(&candidate.user_id) {
                continue;
            }
            names.push(candidate.username.clone());
            group.members.push(candidate.clone());
            effects.push(Effect::AddMember(candidate));
        }

        if !names.is_empty() {
            let verb = if names.len() == 1 { "was" } else { "were" };
            effects.push(Effect::SystemMessage {
                sender_id: actor_id.to_string(),
                text: format!("{} {} added to the group", names.join(", "), verb),
            });
        }

        Ok(Transition {
            state: Self::GroupActive(group),
            effects,
        })
    }

    fn into_admin_group(self, actor_id: &str) -> Result<Group> {
        match self {
            Self::GroupActive(group) if group.is_admin(actor_id) => Ok(group),
            Self::GroupActive(_) | Self::Direct(_) => Err(Error::NotAdmin),
            Self::Deleted => Err(Error::NotFound("conversation")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(name: &str) -> Member {
        Member::new(format!("id-{}", name), name)
    }

    fn trip() -> ConversationState {
        ConversationState::GroupActive(Group::new(m("alice"), vec![m("bob"), m("carol")]))
    }

    fn names(state: &ConversationState) -> Vec<&str> {
        state.members().iter().map(|m| m.username.as_str()).collect()
    }

    #[test]
    fn participants_decide_the_shape() {
        let direct = ConversationState::from_participants(m("alice"), vec![m("bob"), m("bob")]).unwrap();
        assert!(matches!(direct, ConversationState::Direct(_)));
        assert!(direct.admin().is_none());

        let group =
            ConversationState::from_participants(m("alice"), vec![m("bob"), m("carol")]).unwrap();
        assert_eq!(group.admin().unwrap().username, "alice");

        let alone = ConversationState::from_participants(m("alice"), vec![m("alice")]);
        assert!(matches!(alone, Err(Error::InvalidParticipants)));
    }

    #[test]
    fn stored_state_must_satisfy_invariants() {
        assert!(ConversationState::load(true, Some("id-zed"), vec![m("alice")]).is_err());
        assert!(ConversationState::load(true, None, vec![m("alice")]).is_err());
        assert!(ConversationState::load(false, None, vec![m("alice")]).is_err());
        assert!(ConversationState::load(false, Some("id-alice"), vec![m("alice"), m("bob")]).is_err());
        assert!(ConversationState::load(false, None, vec![m("alice"), m("bob")]).is_ok());
    }

    #[test]
    fn only_admin_removes_and_admin_cannot_be_removed() {
        assert!(matches!(trip().remove_member("id-bob", &m("carol")), Err(Error::NotAdmin)));
        assert!(matches!(
            trip().remove_member("id-alice", &m("alice")),
            Err(Error::CannotRemoveAdmin)
        ));
        assert!(matches!(trip().remove_member("id-alice", &m("dave")), Err(Error::NotAMember)));

        let t = trip().remove_member("id-alice", &m("bob")).unwrap();
        assert_eq!(names(&t.state), vec!["alice", "carol"]);
        assert_eq!(t.state.admin().unwrap().username, "alice");
        assert_eq!(
            t.effects.last(),
            Some(&Effect::SystemMessage {
                sender_id: "id-alice".into(),
                text: "bob was removed from the group".into(),
            })
        );
    }

    #[test]
    fn removing_last_non_admin_keeps_group_active() {
        let pair = ConversationState::GroupActive(Group::new(m("alice"), vec![m("bob")]));
        let t = pair.remove_member("id-alice", &m("bob")).unwrap();
        assert!(t.state.is_group());
        assert_eq!(names(&t.state), vec!["alice"]);
        assert_eq!(t.state.admin().unwrap().username, "alice");
    }

    #[test]
    fn admin_leaving_hands_over_to_earliest_joined() {
        let t = trip().leave("id-alice").unwrap();
        assert_eq!(t.state.admin().unwrap().username, "bob");
        assert_eq!(names(&t.state), vec!["bob", "carol"]);
        assert_eq!(t.effects[0], Effect::SetAdmin("id-bob".into()));
        assert_eq!(t.effects[1], Effect::RemoveMember("id-alice".into()));
    }

    #[test]
    fn last_member_leaving_deletes() {
        let solo = ConversationState::GroupActive(Group::new(m("alice"), vec![]));
        let t = solo.leave("id-alice").unwrap();
        assert_eq!(t.state, ConversationState::Deleted);
        assert_eq!(t.effects, vec![Effect::DeleteConversation]);
    }

    #[test]
    fn leave_rules() {
        assert!(matches!(trip().leave("id-dave"), Err(Error::NotAMember)));

        let t = trip().leave("id-carol").unwrap();
        assert_eq!(t.state.admin().unwrap().username, "alice");
        assert_eq!(names(&t.state), vec!["alice", "bob"]);

        let direct = ConversationState::from_participants(m("alice"), vec![m("bob")]).unwrap();
        assert!(matches!(direct.leave("id-alice"), Err(Error::NotFound(_))));
        assert!(matches!(ConversationState::Deleted.leave("id-alice"), Err(Error::NotFound(_))));
    }

    #[test]
    fn delete_requires_group_admin() {
        assert!(matches!(trip().delete("id-bob"), Err(Error::NotAdmin)));
        let direct = ConversationState::from_participants(m("alice"), vec![m("bob")]).unwrap();
        assert!(matches!(direct.delete("id-alice"), Err(Error::NotAdmin)));
        assert_eq!(trip().delete("id-alice").unwrap().state, ConversationState::Deleted);
    }

    #[test]
    fn add_members_skips_present_and_lists_new() {
        assert!(matches!(trip().add_members("id-bob", vec![m("dave")]), Err(Error::NotAdmin)));

        let t = trip()
            .add_members("id-alice", vec![m("bob"), m("dave"), m("erin"), m("dave")])
            .unwrap();
        let added: Vec<_> = t.added().map(|m| m.username.as_str()).collect();
        assert_eq!(added, vec!["dave", "erin"]);
        assert_eq!(
            t.effects.last(),
            Some(&Effect::SystemMessage {
                sender_id: "id-alice".into(),
                text: "dave, erin were added to the group".into(),
            })
        );

        let one = trip().add_members("id-alice", vec![m("dave")]).unwrap();
        assert!(matches!(
            one.effects.last(),
            Some(Effect::SystemMessage { text, .. }) if text == "dave was added to the group"
        ));

        let none = trip().add_members("id-alice", vec![m("carol")]).unwrap();
        assert!(none.effects.is_empty());
    }

    #[test]
    fn sender_must_be_current_member() {
        assert!(trip().check_sender("id-bob").is_ok());
        let t = trip().remove_member("id-alice", &m("bob")).unwrap();
        assert!(matches!(t.state.check_sender("id-bob"), Err(Error::NotAMember)));
    }

    #[test]
    fn trip_scenario() {
        let t = trip().remove_member("id-alice", &m("bob")).unwrap();
        assert_eq!(names(&t.state), vec!["alice", "carol"]);

        let t = t.state.leave("id-alice").unwrap();
        assert_eq!(t.state.admin().unwrap().username, "carol");
        assert_eq!(names(&t.state), vec!["carol"]);

        let t = t.state.leave("id-carol").unwrap();
        assert_eq!(t.state, ConversationState::Deleted);
    }
}
