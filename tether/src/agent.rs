//! Agent-side request loop.

use std::io::{Read, Write};

use tether_proto::{Channel, Directive, Message, Reply, Signal};
use tracing::{debug, info};

use crate::error::Result;

/// Answers directives received from the controller.
pub trait Responder {
    /// Handles one directive. Returns the reply to send, or `None` for
    /// notifications that take no reply.
    fn handle(&mut self, directive: Directive) -> Option<Reply>;

    /// Called for replies to directives the agent sent itself.
    fn on_reply(&mut self, reply: Reply) {
        debug!(reply = reply.name(), ok = reply.ok, "unsolicited reply");
    }
}

impl<F: FnMut(Directive) -> Option<Reply>> Responder for F {
    fn handle(&mut self, directive: Directive) -> Option<Reply> {
        self(directive)
    }
}

/// Serves one controller connection until it detaches, terminates the
/// target, or closes the stream.
///
/// Clone [`Channel::writer`] before calling this to push directives to the
/// controller from other threads.
pub fn serve<R: Read, W: Write>(channel: Channel<R, W>, responder: &mut impl Responder) -> Result<()> {
    let (mut reader, writer) = channel.split();
    loop {
        let directive = match reader.try_recv()? {
            // Clean disconnect.
            None => {
                info!("controller disconnected");
                return Ok(());
            }
            Some(Message::Directive(d)) => d,
            Some(Message::Reply(r)) => {
                responder.on_reply(r);
                continue;
            }
            Some(_) => continue,
        };

        let last = matches!(
            directive.signal(),
            Some(Signal::Detach | Signal::TerminateTargetJvm)
        );
        if let Some(reply) = responder.handle(directive) {
            writer.send_reply(&reply)?;
        }
        if last {
            info!("controller detached");
            return Ok(());
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;
    use std::thread;

    use tether_proto::{
        AsyncMessage, ClassQuery, Directive, EventBufferDumped, HeapHistogram, HistogramRow,
        InitiateProfiling, InstrType, MethodInvokedFirstTime, MethodNames, ReplyBody,
        VmProperties, WireConfig, WireWriter,
    };

    use super::*;
    use crate::{Client, Error};

    type UnixClient = Client<std::io::BufReader<UnixStream>, UnixStream>;

    /// Starts an agent thread serving the responder built by `make`, and
    /// returns a client connected to it.
    fn spawn_agent<F, H>(make: F) -> (UnixClient, thread::JoinHandle<Result<()>>)
    where
        F: FnOnce(Arc<WireWriter<UnixStream>>) -> H + Send + 'static,
        H: Responder,
    {
        let (a, b) = UnixStream::pair().unwrap();
        let client = Client::new(Channel::over_unix(a, WireConfig::default()).unwrap());
        let handle = thread::spawn(move || {
            let channel = Channel::over_unix(b, WireConfig::default())?;
            let mut responder = make(Arc::clone(channel.writer()));
            serve(channel, &mut responder)
        });
        (client, handle)
    }

    fn histogram() -> HeapHistogram {
        HeapHistogram {
            time_millis: 5,
            new_classes: Vec::new(),
            rows: vec![HistogramRow {
                class_id: 1,
                instances: 3,
                bytes: 72,
            }],
        }
    }

    fn basic(directive: Directive) -> Option<Reply> {
        match directive {
            Directive::Signal(Signal::GetHeapHistogram) => {
                Some(Reply::with_body(ReplyBody::HeapHistogram(histogram())))
            }
            Directive::Signal(Signal::GetVmProperties) => Some(Reply::ack()),
            Directive::GetClassId(q) if q.class_name == "Main" => {
                Some(Reply::with_body(ReplyBody::ClassId(12)))
            }
            Directive::GetMethodNames(q) => {
                let names: Vec<String> = q.method_ids.iter().map(|id| format!("m{id}")).collect();
                Some(Reply::with_body(ReplyBody::MethodNames(
                    MethodNames::pack(&names).unwrap(),
                )))
            }
            Directive::TakeHeapDump(_) => Some(Reply::failed("disk full")),
            Directive::MethodInvokedFirstTime(_) => None,
            _ => Some(Reply::ack()),
        }
    }

    #[test]
    fn typed_requests() {
        let (mut client, agent) = spawn_agent(|_| basic);

        client.check_connection().unwrap();
        client
            .initiate_profiling(InitiateProfiling::new(
                InstrType::RecursiveFull,
                vec!["Main".into()],
            ))
            .unwrap();
        assert_eq!(client.heap_histogram().unwrap(), histogram());
        assert_eq!(client.class_id(ClassQuery::new("Main", 0)).unwrap(), 12);

        let names = client.method_names(vec![1, 2]).unwrap();
        assert_eq!(names.unpack().unwrap(), vec!["m1", "m2"]);

        client.detach().unwrap();
        agent.join().unwrap().unwrap();
    }

    #[test]
    fn failures_surface_as_errors() {
        let (mut client, agent) = spawn_agent(|_| basic);

        match client.take_heap_dump("/tmp/heap.hprof") {
            Err(Error::Rejected { message }) => assert_eq!(message, "disk full"),
            other => panic!("unexpected {other:?}"),
        }
        match client.vm_properties() {
            Err(Error::UnexpectedReply { expected, got }) => {
                assert_eq!(expected, "VmProperties");
                assert_eq!(got, "Ack");
            }
            other => panic!("unexpected {other:?}"),
        }
        // The connection survives application-level failures.
        client.check_connection().unwrap();

        drop(client);
        agent.join().unwrap().unwrap();
    }

    #[test]
    fn agent_directives_are_queued_while_waiting() {
        let (mut client, agent) = spawn_agent(|tx| {
            move |d: Directive| match d {
                Directive::Signal(Signal::GetVmProperties) => {
                    let note = Directive::AsyncMessage(AsyncMessage::new(true, "warming up"));
                    tx.send_directive(&note).unwrap();
                    tx.send_directive(&Signal::StillAlive.into()).unwrap();
                    tx.send_directive(&Directive::EventBufferDumped(EventBufferDumped::Inline(
                        vec![7; 32],
                    )))
                    .unwrap();
                    Some(Reply::with_body(ReplyBody::VmProperties(VmProperties {
                        jdk_version: "21".into(),
                        ..VmProperties::default()
                    })))
                }
                _ => Some(Reply::ack()),
            }
        });

        assert_eq!(client.vm_properties().unwrap().jdk_version, "21");

        match client.next_directive().unwrap() {
            Some(Directive::AsyncMessage(m)) => assert_eq!(m.message, "warming up"),
            other => panic!("unexpected {other:?}"),
        }
        match client.next_directive().unwrap() {
            Some(Directive::EventBufferDumped(b)) => assert_eq!(b.size(), 32),
            other => panic!("unexpected {other:?}"),
        }

        client.terminate().unwrap();
        agent.join().unwrap().unwrap();
    }

    #[test]
    fn notifications_get_no_reply() {
        let (mut client, agent) = spawn_agent(|_| basic);

        client
            .notify(&Directive::MethodInvokedFirstTime(MethodInvokedFirstTime::new(4)))
            .unwrap();
        // The next reply belongs to this request, not the notification.
        client.check_connection().unwrap();
        client.detach().unwrap();
        agent.join().unwrap().unwrap();
    }

    #[test]
    fn controller_answers_agent_requests() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut client = Client::new(Channel::over_unix(a, WireConfig::default()).unwrap());
        let mut agent = Channel::over_unix(b, WireConfig::default()).unwrap();

        agent
            .writer()
            .send_directive(&Directive::GetDefiningClassLoader(ClassQuery::new("Main", 3)))
            .unwrap();
        match client.next_directive().unwrap() {
            Some(Directive::GetDefiningClassLoader(q)) => assert_eq!(q.class_loader_id, 3),
            other => panic!("unexpected {other:?}"),
        }
        client
            .reply(&Reply::with_body(ReplyBody::DefiningLoader(1)))
            .unwrap();
        assert_eq!(
            agent.reader().recv_reply().unwrap().body,
            ReplyBody::DefiningLoader(1)
        );

        drop(agent);
        assert!(client.next_directive().unwrap().is_none());
    }
}
