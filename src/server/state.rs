use crate::pipeline::Pipeline;

pub(crate) struct ServerState {
    pub(crate) pipeline: Pipeline,
}
