use bytes::Bytes;
use futures::future::{self, BoxFuture, FutureExt};
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::commands::CommandError;
use crate::reply::Reply;
use crate::request::{FromArgs, Request};

/// The uniform shape every registered command is normalized to.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Request) -> BoxFuture<'static, Result<Reply, CommandError>>;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn call(&self, request: Request) -> BoxFuture<'static, Result<Reply, CommandError>> {
        (**self).call(request)
    }
}

/// A handler built from an async closure that receives the raw request.
pub struct HandlerFn<F> {
    f: F,
}

pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply, CommandError>> + Send + 'static,
{
    HandlerFn { f }
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply, CommandError>> + Send + 'static,
{
    fn call(&self, request: Request) -> BoxFuture<'static, Result<Reply, CommandError>> {
        (self.f)(request).boxed()
    }
}

/// A method of a service with typed parameters, `fn(&S, &Request, A1, ..., An) -> R`.
///
/// Every parameter is extracted from the request arguments in order; arguments left over once all of
/// them are extracted are an arity error.
pub trait Method<S, Args>: Send + Sync + 'static {
    fn invoke(&self, service: &S, request: &Request) -> Result<Reply, CommandError>;
}

macro_rules! impl_method {
    ($($ty:ident),*) => {
        impl<S, F, R, $($ty,)*> Method<S, ($($ty,)*)> for F
        where
            F: Fn(&S, &Request, $($ty),*) -> R + Send + Sync + 'static,
            R: IntoReply,
            $($ty: FromArgs,)*
        {
            #[allow(non_snake_case, unused_mut)]
            fn invoke(&self, service: &S, request: &Request) -> Result<Reply, CommandError> {
                let mut args = request.arguments();
                $(let $ty = $ty::from_args(&mut args)?;)*
                args.finish()?;
                (self)(service, request, $($ty),*).into_reply()
            }
        }
    };
}

impl_method!();
impl_method!(A1);
impl_method!(A1, A2);
impl_method!(A1, A2, A3);
impl_method!(A1, A2, A3, A4);
impl_method!(A1, A2, A3, A4, A5);
impl_method!(A1, A2, A3, A4, A5, A6);

/// Binds a [`Method`] to the service instance it is called on.
pub(crate) struct MethodHandler<S, M, Args> {
    service: Arc<S>,
    method: M,
    _args: PhantomData<fn() -> Args>,
}

impl<S, M, Args> MethodHandler<S, M, Args> {
    pub(crate) fn new(service: Arc<S>, method: M) -> Self {
        MethodHandler {
            service,
            method,
            _args: PhantomData,
        }
    }
}

impl<S, M, Args> Handler for MethodHandler<S, M, Args>
where
    S: Send + Sync + 'static,
    M: Method<S, Args>,
    Args: 'static,
{
    fn call(&self, request: Request) -> BoxFuture<'static, Result<Reply, CommandError>> {
        future::ready(self.method.invoke(&self.service, &request)).boxed()
    }
}

/// Converts the value returned by a method into a reply.
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, CommandError>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, CommandError> {
        Ok(self)
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Reply, CommandError> {
        Ok(Reply::ok())
    }
}

impl IntoReply for bool {
    fn into_reply(self) -> Result<Reply, CommandError> {
        Ok(Reply::Integer(self as i64))
    }
}

macro_rules! into_reply_integer {
    ($($ty:ty),*) => {
        $(
            impl IntoReply for $ty {
                fn into_reply(self) -> Result<Reply, CommandError> {
                    i64::try_from(self)
                        .map(Reply::Integer)
                        .map_err(|_| CommandError::err("integer reply out of range"))
                }
            }
        )*
    };
}

into_reply_integer!(i64, i32, u32, u64, usize);

impl IntoReply for Bytes {
    fn into_reply(self) -> Result<Reply, CommandError> {
        Ok(Reply::Bulk(self))
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Result<Reply, CommandError> {
        Ok(Reply::Bulk(Bytes::from(self)))
    }
}

impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Result<Reply, CommandError> {
        match self {
            Some(value) => value.into_reply(),
            None => Ok(Reply::Nil),
        }
    }
}

impl<T: IntoReply> IntoReply for Vec<T> {
    fn into_reply(self) -> Result<Reply, CommandError> {
        self.into_iter()
            .map(IntoReply::into_reply)
            .collect::<Result<Vec<_>, _>>()
            .map(Reply::Array)
    }
}

/// Flattened into `key, value, key, value, ...`.
impl<K: IntoReply, V: IntoReply> IntoReply for HashMap<K, V> {
    fn into_reply(self) -> Result<Reply, CommandError> {
        let mut replies = Vec::with_capacity(self.len() * 2);
        for (key, value) in self {
            replies.push(key.into_reply()?);
            replies.push(value.into_reply()?);
        }
        Ok(Reply::Array(replies))
    }
}

impl<T: IntoReply, E: Into<CommandError>> IntoReply for Result<T, E> {
    fn into_reply(self) -> Result<Reply, CommandError> {
        self.map_err(Into::into)?.into_reply()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        base: i64,
    }

    impl Counter {
        fn add(&self, _request: &Request, a: i64, b: Option<i64>) -> i64 {
            self.base + a + b.unwrap_or(0)
        }

        fn join(&self, _request: &Request, sep: String, parts: Vec<String>) -> String {
            parts.join(&sep)
        }

        fn fail(&self, _request: &Request) -> Result<(), CommandError> {
            Err(CommandError::err("nope"))
        }
    }

    fn request(name: &str, args: &[&str]) -> Request {
        Request::new(
            name.to_string(),
            args.iter().map(|arg| Bytes::from(arg.to_string())).collect(),
        )
    }

    async fn call<H: Handler>(handler: &H, req: Request) -> Result<Reply, CommandError> {
        handler.call(req).await
    }

    #[tokio::test]
    async fn method_with_typed_and_optional_arguments() {
        let handler = MethodHandler::new(Arc::new(Counter { base: 10 }), Counter::add);

        let reply = call(&handler, request("ADD", &["1", "2"])).await.unwrap();
        assert_eq!(reply, Reply::Integer(13));

        let reply = call(&handler, request("ADD", &["1"])).await.unwrap();
        assert_eq!(reply, Reply::Integer(11));
    }

    #[tokio::test]
    async fn method_arity_and_type_errors() {
        let handler = MethodHandler::new(Arc::new(Counter { base: 0 }), Counter::add);

        let err = call(&handler, request("ADD", &[])).await.unwrap_err();
        assert_eq!(err.to_string(), "ERR wrong number of arguments for 'add' command");

        let err = call(&handler, request("ADD", &["1", "2", "3"])).await.unwrap_err();
        assert!(matches!(err, CommandError::WrongArity(_)));

        let err = call(&handler, request("ADD", &["one"])).await.unwrap_err();
        assert!(matches!(err, CommandError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn method_with_variadic_arguments() {
        let handler = MethodHandler::new(Arc::new(Counter { base: 0 }), Counter::join);

        let reply = call(&handler, request("JOIN", &["-", "a", "b", "c"])).await.unwrap();
        assert_eq!(reply, Reply::bulk("a-b-c"));

        let reply = call(&handler, request("JOIN", &["-"])).await.unwrap();
        assert_eq!(reply, Reply::bulk(""));
    }

    #[tokio::test]
    async fn method_returning_an_error() {
        let handler = MethodHandler::new(Arc::new(Counter { base: 0 }), Counter::fail);

        let err = call(&handler, request("FAIL", &[])).await.unwrap_err();
        assert_eq!(err.to_string(), "ERR nope");
    }

    #[tokio::test]
    async fn async_handler_fn() {
        let handler = handler_fn(|request: Request| async move {
            Ok::<_, CommandError>(Reply::Integer(request.args().len() as i64))
        });

        let reply = call(&handler, request("COUNT", &["a", "b"])).await.unwrap();
        assert_eq!(reply, Reply::Integer(2));
    }

    #[test]
    fn into_reply_conversions() {
        assert_eq!(().into_reply().unwrap(), Reply::ok());
        assert_eq!(true.into_reply().unwrap(), Reply::Integer(1));
        assert_eq!(None::<Bytes>.into_reply().unwrap(), Reply::Nil);
        assert_eq!(
            vec![Some(Bytes::from("a")), None].into_reply().unwrap(),
            Reply::Array(vec![Reply::bulk("a"), Reply::Nil])
        );
        assert!(u64::MAX.into_reply().is_err());

        let map = HashMap::from([(String::from("field"), Bytes::from("value"))]);
        assert_eq!(
            map.into_reply().unwrap(),
            Reply::Array(vec![Reply::bulk("field"), Reply::bulk("value")])
        );
    }
}
