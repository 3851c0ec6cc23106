use crate::{
    error::EngineError,
    model::{job::Job, role::Role},
    store::JobFilter,
};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

/// Caller identity, placed in request extensions by `auth_middleware`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is a field member
    pub member_id: Option<u64>,
    /// Present only if this user is a client contact
    pub client_id: Option<u64>,
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| EngineError::Unauthorized("Missing token".to_string()).into()),
        )
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), EngineError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(EngineError::forbidden("Admin only"))
        }
    }

    /// Admins, or the member the job is assigned to.
    pub fn require_assignee(&self, job: &Job) -> Result<(), EngineError> {
        match self.role {
            Role::Admin => Ok(()),
            Role::Member if self.member_id == Some(job.assigned_to) => Ok(()),
            _ => Err(EngineError::forbidden("Not assigned to this job")),
        }
    }

    /// Admins, the assigned member, or the job's client.
    pub fn require_visible(&self, job: &Job) -> Result<(), EngineError> {
        match self.role {
            Role::Client if self.client_id == Some(job.client_id) => Ok(()),
            Role::Client => Err(EngineError::forbidden("Not your job")),
            _ => self.require_assignee(job),
        }
    }

    /// Narrows a report filter to what this caller may see. Admin requests
    /// pass through unchanged.
    pub fn scope(&self, requested: JobFilter) -> Result<JobFilter, EngineError> {
        match self.role {
            Role::Admin => Ok(requested),
            Role::Member => {
                let member_id = self
                    .member_id
                    .ok_or_else(|| EngineError::forbidden("No member profile"))?;
                Ok(JobFilter {
                    member_id: Some(member_id),
                    client_id: requested.client_id,
                })
            }
            Role::Client => {
                let client_id = self
                    .client_id
                    .ok_or_else(|| EngineError::forbidden("No client profile"))?;
                Ok(JobFilter {
                    member_id: requested.member_id,
                    client_id: Some(client_id),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::fixture_job;

    fn user(role: Role, member_id: Option<u64>, client_id: Option<u64>) -> AuthUser {
        AuthUser {
            user_id: 1,
            username: "u".into(),
            role,
            member_id,
            client_id,
        }
    }

    #[test]
    fn job_access_follows_assignment() {
        let job = fixture_job(1);
        assert!(user(Role::Admin, None, None).require_assignee(&job).is_ok());
        assert!(user(Role::Member, Some(10), None).require_assignee(&job).is_ok());
        assert!(user(Role::Member, Some(11), None).require_assignee(&job).is_err());
        assert!(user(Role::Client, None, Some(20)).require_assignee(&job).is_err());
        assert!(user(Role::Client, None, Some(20)).require_visible(&job).is_ok());
        assert!(matches!(
            user(Role::Client, None, Some(21)).require_visible(&job),
            Err(EngineError::Forbidden(_))
        ));
    }

    #[test]
    fn report_scope_is_forced_for_non_admins() {
        let asked = JobFilter::member(11);
        assert_eq!(user(Role::Admin, None, None).scope(asked).unwrap(), asked);
        assert_eq!(
            user(Role::Member, Some(10), None).scope(asked).unwrap(),
            JobFilter::member(10)
        );
        let client = user(Role::Client, None, Some(20))
            .scope(JobFilter::default())
            .unwrap();
        assert_eq!(client, JobFilter::client(20));
        assert!(user(Role::Member, None, None).scope(asked).is_err());
    }
}
