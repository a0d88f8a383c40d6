mod campaign;
mod contractor;
pub(crate) mod job;
mod submission;
pub(crate) mod timeline;

pub(crate) use campaign::{CampaignKind, EmailCampaign, EmailSend, NewEmailCampaign, NewEmailSend};
pub(crate) use contractor::{graphql::CreateContractorInput, Contractor, NewContractor};
pub(crate) use job::{graphql::CreateJobInput, NewSwmsJob, SwmsJob};
pub(crate) use submission::{
    graphql::{CreateSubmissionInput, ReviewSubmissionInput},
    NewSubmission, Review, SwmsSubmission,
};
pub(crate) use timeline::graphql::TimelineEvent;
